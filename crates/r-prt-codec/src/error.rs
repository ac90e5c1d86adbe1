//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Error taxonomy for the Sampled Value codec."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use r_prt_common::ConfigError;
use r_prt_rt::RtError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stream {0} is not registered")]
    UnknownStream(String),
    #[error("stream {0} already exists")]
    DuplicateStream(String),
    #[error("stream {0} is running; stop it before changing its configuration")]
    StreamRunning(String),
    #[error("configuration for stream {expected} carries svID {found}")]
    IdMismatch { expected: String, found: String },
    #[error("stream {stream} has {channels} channels but {provided} phasors were supplied")]
    TooManyPhasors {
        stream: String,
        provided: usize,
        channels: usize,
    },
    #[error("stream {0} is in file playback mode but has no waveform source")]
    MissingSource(String),
    #[error("failed to start tick driver: {0}")]
    Driver(#[from] RtError),
}

/// Raw frame transport failures. Transient: logged and counted, never retried here.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transmit queue full ({capacity} frames)")]
    QueueFull { capacity: usize },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("frame truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("ethertype {ethertype:#06x} is not Sampled Values")]
    NotSampledValues { ethertype: u16 },
    #[error("length field declares {declared} bytes but {actual} follow")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("{remaining} trailing bytes do not form a whole channel")]
    PartialChannel { remaining: usize },
    #[error("svID is not valid UTF-8")]
    InvalidSvId,
}
