//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "01-bootstrap"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sampled Value codec module exports and shared types."
//! prt_version: "v0.1.0"
//! prt_owner: "tbd"
//! ---
//! IEC 61850-9-2 Sampled Value publishing for the R-PRT bench.
//!
//! A [`SvStream`] turns phasor state into one wire frame per tick; the
//! [`StreamManager`] owns the streams and drives each running one from its own
//! real-time thread.

pub mod config;
pub mod error;
pub mod frame;
pub mod manager;
pub mod playback;
pub mod stream;
pub mod transport;

pub use config::{
    default_channel_layout, ChannelConfig, ChannelKind, DataSourceMode, MacAddress, StreamConfig,
};
pub use error::{CodecError, FrameDecodeError, TransportError};
pub use frame::{decode_frame, encode_frame, scale_values, synthesize_values, DecodedSvFrame};
pub use manager::StreamManager;
pub use playback::{RecordedWaveform, WaveformSource};
pub use stream::{StreamStatus, SvStream};
pub use transport::{LoopbackTransport, NullTransport, RawFrameReceiver, RawFrameSender};
