//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Stream identity, channel layout and data source configuration."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use r_prt_common::{CodecConfig, ConfigError, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Ethernet hardware address, written as `01:0C:CD:04:00:01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, SerializeDisplay, DeserializeFromStr)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Invalid {
            field: "mac address",
            value: s.to_owned(),
        };
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    Voltage,
    Current,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub kind: ChannelKind,
    /// RMS value that maps onto `headroom` of the integer range.
    pub full_scale_rms: f64,
}

impl ChannelConfig {
    pub fn new(name: &str, kind: ChannelKind, full_scale_rms: f64) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            full_scale_rms,
        }
    }
}

/// Where a stream's sample values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSourceMode {
    #[default]
    Manual,
    FilePlayback,
}

/// Identity and sampling parameters of one Sampled Value stream.
///
/// The svID doubles as the stream identifier inside the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sv_id: String,
    #[serde(default = "default_app_id")]
    pub app_id: u16,
    #[serde(default = "default_dst_mac")]
    pub dst_mac: MacAddress,
    #[serde(default = "default_src_mac")]
    pub src_mac: MacAddress,
    #[serde(default)]
    pub vlan_id: u16,
    #[serde(default = "default_vlan_priority")]
    pub vlan_priority: u8,
    #[serde(default = "default_conf_rev")]
    pub conf_rev: u32,
    /// smpSynch: 0 none, 1 local, 2 global.
    #[serde(default = "default_smp_synch")]
    pub smp_synch: u8,
    #[serde(default = "default_nominal_frequency")]
    pub nominal_frequency: f64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_headroom")]
    pub headroom: f64,
    #[serde(default)]
    pub mode: DataSourceMode,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

fn default_app_id() -> u16 {
    0x4000
}

fn default_dst_mac() -> MacAddress {
    MacAddress([0x01, 0x0C, 0xCD, 0x04, 0x00, 0x01])
}

fn default_src_mac() -> MacAddress {
    MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
}

fn default_vlan_priority() -> u8 {
    4
}

fn default_conf_rev() -> u32 {
    1
}

fn default_smp_synch() -> u8 {
    2
}

fn default_nominal_frequency() -> f64 {
    CodecConfig::default().nominal_frequency
}

fn default_sample_rate() -> u32 {
    CodecConfig::default().sample_rate
}

fn default_headroom() -> f64 {
    CodecConfig::default().headroom
}

fn default_channels() -> Vec<ChannelConfig> {
    let codec = CodecConfig::default();
    default_channel_layout(codec.voltage_full_scale, codec.current_full_scale)
}

/// `Va Vb Vc Vn Ia Ib Ic In`.
pub fn default_channel_layout(voltage_full_scale: f64, current_full_scale: f64) -> Vec<ChannelConfig> {
    let voltage = |name| ChannelConfig::new(name, ChannelKind::Voltage, voltage_full_scale);
    let current = |name| ChannelConfig::new(name, ChannelKind::Current, current_full_scale);
    vec![
        voltage("Va"),
        voltage("Vb"),
        voltage("Vc"),
        voltage("Vn"),
        current("Ia"),
        current("Ib"),
        current("Ic"),
        current("In"),
    ]
}

impl StreamConfig {
    /// Stream with the default identity and the rates and scales from `[codec]`.
    pub fn with_codec_defaults(sv_id: impl Into<String>, codec: &CodecConfig) -> Self {
        Self {
            sv_id: sv_id.into(),
            app_id: default_app_id(),
            dst_mac: default_dst_mac(),
            src_mac: default_src_mac(),
            vlan_id: 0,
            vlan_priority: default_vlan_priority(),
            conf_rev: default_conf_rev(),
            smp_synch: default_smp_synch(),
            nominal_frequency: codec.nominal_frequency,
            sample_rate: codec.sample_rate,
            headroom: codec.headroom,
            mode: DataSourceMode::Manual,
            channels: default_channel_layout(codec.voltage_full_scale, codec.current_full_scale),
        }
    }

    pub fn new(sv_id: impl Into<String>) -> Self {
        Self::with_codec_defaults(sv_id, &CodecConfig::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sv_id.is_empty() {
            return Err(ConfigError::Empty { field: "sv_id" });
        }
        if self.sv_id.len() > u8::MAX as usize {
            return Err(ConfigError::OutOfRange {
                field: "sv_id",
                value: self.sv_id.len().to_string(),
                reason: "svID is limited to 255 bytes",
            });
        }
        if self.vlan_id > 0x0FFF {
            return Err(ConfigError::OutOfRange {
                field: "vlan_id",
                value: self.vlan_id.to_string(),
                reason: "VLAN identifiers are 12 bits",
            });
        }
        if self.vlan_priority > 7 {
            return Err(ConfigError::OutOfRange {
                field: "vlan_priority",
                value: self.vlan_priority.to_string(),
                reason: "VLAN priority is 3 bits",
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sample_rate",
                value: "0".into(),
                reason: "must be positive",
            });
        }
        if !(self.nominal_frequency > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "nominal_frequency",
                value: self.nominal_frequency.to_string(),
                reason: "must be positive",
            });
        }
        if !(self.headroom > 0.0 && self.headroom <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "headroom",
                value: self.headroom.to_string(),
                reason: "must lie in (0, 1]",
            });
        }
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::OutOfRange {
                field: "channels",
                value: self.channels.len().to_string(),
                reason: "between 1 and 8 channels per stream",
            });
        }
        for channel in &self.channels {
            if channel.name.is_empty() {
                return Err(ConfigError::Empty {
                    field: "channel name",
                });
            }
            if !(channel.full_scale_rms > 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "full_scale_rms",
                    value: channel.full_scale_rms.to_string(),
                    reason: "must be positive",
                });
            }
        }
        Ok(())
    }

    /// Integer counts per engineering unit for `channel`.
    pub fn scale_factor(&self, channel: usize) -> Option<f64> {
        self.channels
            .get(channel)
            .map(|c| self.headroom * i32::MAX as f64 / c.full_scale_rms)
    }
}
