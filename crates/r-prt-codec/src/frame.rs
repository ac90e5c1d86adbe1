//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sampled Value sample synthesis and wire frame encoding/decoding."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Sampled Value wire format.
//!
//! ```text
//! dst(6) src(6) 0x8100(2) TCI(2) 0x88BA(2) APPID(2) length(2) reserved(2)
//! svID-len(1) svID smpCnt(2) confRev(4) smpSynch(1) { value(4) quality(4) }*
//! ```
//!
//! All multi-byte fields are big-endian. `length` counts the bytes from APPID to the
//! end of the frame.

use bytes::{Buf, BufMut, BytesMut};
use r_prt_common::{HarmonicSpec, Phasor, PhasorSet};
use serde::{Deserialize, Serialize};

use crate::config::{MacAddress, StreamConfig};
use crate::error::FrameDecodeError;

pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_SV: u16 = 0x88BA;

const MAC_HEADER_LEN: usize = 12;
/// APPID, length, reserved, svID length.
const APP_HEADER_FIXED: usize = 7;
/// smpCnt, confRev, smpSynch.
const ASDU_FIXED: usize = 7;
const CHANNEL_LEN: usize = 8;

/// Instantaneous engineering values for one tick.
///
/// `t = counter / sample_rate`; each channel is the fundamental phasor plus its
/// harmonics, every component evaluated as `√2·M·sin(2π·f·t + φ)`.
pub fn synthesize_values(
    config: &StreamConfig,
    frequency: f64,
    phasors: &PhasorSet,
    harmonics: &HarmonicSpec,
    counter: u64,
) -> Vec<f64> {
    let t = counter as f64 / config.sample_rate as f64;
    (0..config.channels.len())
        .map(|channel| {
            let fundamental = phasors.channel_or_zero(channel);
            let mut value = fundamental.instantaneous(frequency, t);
            for harmonic in harmonics.channel(channel) {
                let component = Phasor::new(
                    fundamental.magnitude * harmonic.magnitude_pct / 100.0,
                    harmonic.angle_deg,
                );
                value += component.instantaneous(frequency * harmonic.order as f64, t);
            }
            value
        })
        .collect()
}

/// Convert engineering values to saturated fixed-point samples.
pub fn scale_values(config: &StreamConfig, values: &[f64]) -> Vec<i32> {
    values
        .iter()
        .enumerate()
        .map(|(channel, value)| {
            let k = config.scale_factor(channel).unwrap_or(0.0);
            (value * k).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
        })
        .collect()
}

/// Wire sample counter: one-second rollover, truncated to 16 bits.
pub fn wire_sample_count(config: &StreamConfig, counter: u64) -> u16 {
    (counter % config.sample_rate.max(1) as u64) as u16
}

pub fn frame_len(config: &StreamConfig, channels: usize) -> usize {
    MAC_HEADER_LEN + 4 + 2 + application_len(config, channels)
}

fn application_len(config: &StreamConfig, channels: usize) -> usize {
    APP_HEADER_FIXED + config.sv_id.len() + ASDU_FIXED + CHANNEL_LEN * channels
}

/// Serialize one frame into `buf`, which is cleared first.
pub fn encode_frame(config: &StreamConfig, samples: &[i32], counter: u64, buf: &mut BytesMut) {
    buf.clear();
    buf.reserve(frame_len(config, samples.len()));
    buf.put_slice(&config.dst_mac.octets());
    buf.put_slice(&config.src_mac.octets());
    buf.put_u16(ETHERTYPE_VLAN);
    buf.put_u16(((config.vlan_priority as u16 & 0x7) << 13) | (config.vlan_id & 0x0FFF));
    buf.put_u16(ETHERTYPE_SV);
    buf.put_u16(config.app_id);
    buf.put_u16(application_len(config, samples.len()) as u16);
    buf.put_u16(0);
    buf.put_u8(config.sv_id.len() as u8);
    buf.put_slice(config.sv_id.as_bytes());
    buf.put_u16(wire_sample_count(config, counter));
    buf.put_u32(config.conf_rev);
    buf.put_u8(config.smp_synch);
    for sample in samples {
        buf.put_i32(*sample);
        buf.put_u32(0);
    }
}

/// Parsed view of a received Sampled Value frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSvFrame {
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    /// `None` for untagged frames.
    pub vlan_id: Option<u16>,
    pub vlan_priority: Option<u8>,
    pub app_id: u16,
    pub length: u16,
    pub sv_id: String,
    pub smp_cnt: u16,
    pub conf_rev: u32,
    pub smp_synch: u8,
    pub samples: Vec<i32>,
    pub qualities: Vec<u32>,
}

impl DecodedSvFrame {
    /// Raw samples converted back to engineering units using the stream's scaling.
    pub fn scaled_values(&self, config: &StreamConfig) -> Vec<f64> {
        self.samples
            .iter()
            .enumerate()
            .map(|(channel, sample)| match config.scale_factor(channel) {
                Some(k) => *sample as f64 / k,
                None => 0.0,
            })
            .collect()
    }
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), FrameDecodeError> {
    if buf.remaining() < needed {
        return Err(FrameDecodeError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn read_mac(buf: &mut &[u8]) -> MacAddress {
    let mut octets = [0u8; 6];
    buf.copy_to_slice(&mut octets);
    MacAddress(octets)
}

pub fn decode_frame(frame: &[u8]) -> Result<DecodedSvFrame, FrameDecodeError> {
    let mut buf = frame;
    ensure(buf, MAC_HEADER_LEN + 2)?;
    let dst_mac = read_mac(&mut buf);
    let src_mac = read_mac(&mut buf);

    let mut ethertype = buf.get_u16();
    let (mut vlan_id, mut vlan_priority) = (None, None);
    if ethertype == ETHERTYPE_VLAN {
        ensure(buf, 4)?;
        let tci = buf.get_u16();
        vlan_priority = Some((tci >> 13) as u8);
        vlan_id = Some(tci & 0x0FFF);
        ethertype = buf.get_u16();
    }
    if ethertype != ETHERTYPE_SV {
        return Err(FrameDecodeError::NotSampledValues { ethertype });
    }

    ensure(buf, APP_HEADER_FIXED)?;
    let declared_from_app_id = buf.remaining();
    let app_id = buf.get_u16();
    let length = buf.get_u16();
    if length as usize != declared_from_app_id {
        return Err(FrameDecodeError::LengthMismatch {
            declared: length as usize,
            actual: declared_from_app_id,
        });
    }
    let _reserved = buf.get_u16();
    let sv_id_len = buf.get_u8() as usize;
    ensure(buf, sv_id_len + ASDU_FIXED)?;
    let sv_id = std::str::from_utf8(&buf[..sv_id_len])
        .map_err(|_| FrameDecodeError::InvalidSvId)?
        .to_owned();
    buf.advance(sv_id_len);
    let smp_cnt = buf.get_u16();
    let conf_rev = buf.get_u32();
    let smp_synch = buf.get_u8();

    if buf.remaining() % CHANNEL_LEN != 0 {
        return Err(FrameDecodeError::PartialChannel {
            remaining: buf.remaining() % CHANNEL_LEN,
        });
    }
    let channels = buf.remaining() / CHANNEL_LEN;
    let mut samples = Vec::with_capacity(channels);
    let mut qualities = Vec::with_capacity(channels);
    for _ in 0..channels {
        samples.push(buf.get_i32());
        qualities.push(buf.get_u32());
    }

    Ok(DecodedSvFrame {
        dst_mac,
        src_mac,
        vlan_id,
        vlan_priority,
        app_id,
        length,
        sv_id,
        smp_cnt,
        conf_rev,
        smp_synch,
        samples,
        qualities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_prt_common::Harmonic;

    fn stream() -> StreamConfig {
        let mut config = StreamConfig::new("MU01");
        config.vlan_id = 0x123;
        config.vlan_priority = 5;
        config.app_id = 0x4001;
        config.conf_rev = 7;
        config
    }

    fn encode(config: &StreamConfig, phasors: &PhasorSet, counter: u64) -> BytesMut {
        let values = synthesize_values(config, 60.0, phasors, &HarmonicSpec::default(), counter);
        let mut buf = BytesMut::new();
        encode_frame(config, &scale_values(config, &values), counter, &mut buf);
        buf
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let config = stream();
        let buf = encode(&config, &PhasorSet::balanced(63.5, 1.0, 0.0), 0);
        assert_eq!(buf.len(), frame_len(&config, 8));
        assert_eq!(&buf[0..6], &[0x01, 0x0C, 0xCD, 0x04, 0x00, 0x01]);
        assert_eq!(&buf[12..14], &[0x81, 0x00]);
        // priority 5, VLAN 0x123
        assert_eq!(u16::from_be_bytes([buf[14], buf[15]]), (5 << 13) | 0x123);
        assert_eq!(&buf[16..18], &[0x88, 0xBA]);
        assert_eq!(u16::from_be_bytes([buf[18], buf[19]]), 0x4001);
        let length = u16::from_be_bytes([buf[20], buf[21]]) as usize;
        assert_eq!(length, buf.len() - 18);
        assert_eq!(&buf[22..24], &[0, 0]);
        assert_eq!(buf[24] as usize, 4);
        assert_eq!(&buf[25..29], b"MU01");
        assert_eq!(u32::from_be_bytes([buf[31], buf[32], buf[33], buf[34]]), 7);
        assert_eq!(buf[35], 2);
    }

    #[test]
    fn encoding_is_deterministic() {
        let config = stream();
        let phasors = PhasorSet::balanced(63.5, 5.0, 30.0);
        let first = encode(&config, &phasors, 1234);
        let second = encode(&config, &phasors, 1234);
        assert_eq!(first, second);
        assert_ne!(first, encode(&config, &phasors, 1235));
    }

    #[test]
    fn sample_counter_rolls_over_each_second() {
        let config = stream();
        assert_eq!(wire_sample_count(&config, 4799), 4799);
        assert_eq!(wire_sample_count(&config, 4800), 0);
        assert_eq!(wire_sample_count(&config, 4801), 1);
    }

    #[test]
    fn samples_follow_sine_reference_and_scale() {
        let config = stream();
        let phasors = PhasorSet::new(vec![Phasor::new(100.0, 90.0)]).unwrap();
        let values = synthesize_values(&config, 60.0, &phasors, &HarmonicSpec::default(), 0);
        assert!((values[0] - 100.0 * std::f64::consts::SQRT_2).abs() < 1e-9);
        assert_eq!(values[1], 0.0);
        let samples = scale_values(&config, &values);
        let expected = (values[0] * config.scale_factor(0).unwrap()).round() as i32;
        assert_eq!(samples[0], expected);
    }

    #[test]
    fn scaling_saturates() {
        let config = stream();
        let samples = scale_values(&config, &[1e12, -1e12]);
        assert_eq!(samples, vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn harmonics_add_to_fundamental() {
        let config = stream();
        let phasors = PhasorSet::new(vec![Phasor::new(10.0, 0.0)]).unwrap();
        let harmonics = HarmonicSpec::new(vec![vec![Harmonic {
            order: 3,
            magnitude_pct: 10.0,
            angle_deg: 90.0,
        }]])
        .unwrap();
        let values = synthesize_values(&config, 60.0, &phasors, &harmonics, 0);
        // sin(0) fundamental vanishes; third harmonic at 90° peaks.
        assert!((values[0] - std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn decode_inverts_encode() {
        let config = stream();
        let phasors = PhasorSet::balanced(63.5, 5.0, 30.0);
        let buf = encode(&config, &phasors, 4805);
        let decoded = decode_frame(&buf).unwrap();
        assert_eq!(decoded.sv_id, "MU01");
        assert_eq!(decoded.vlan_id, Some(0x123));
        assert_eq!(decoded.vlan_priority, Some(5));
        assert_eq!(decoded.smp_cnt, 5);
        assert_eq!(decoded.samples.len(), 8);
        assert!(decoded.qualities.iter().all(|q| *q == 0));

        let values = synthesize_values(&config, 60.0, &phasors, &HarmonicSpec::default(), 4805);
        for (scaled, original) in decoded.scaled_values(&config).iter().zip(&values) {
            assert!((scaled - original).abs() < 1e-3);
        }
    }

    #[test]
    fn decode_rejects_foreign_and_truncated_frames() {
        let config = stream();
        let buf = encode(&config, &PhasorSet::default(), 0);
        assert!(matches!(
            decode_frame(&buf[..10]),
            Err(FrameDecodeError::Truncated { .. })
        ));
        assert!(matches!(
            decode_frame(&buf[..buf.len() - 3]),
            Err(FrameDecodeError::LengthMismatch { .. })
        ));
        let mut goose = buf.to_vec();
        goose[16] = 0x88;
        goose[17] = 0xB8;
        assert_eq!(
            decode_frame(&goose),
            Err(FrameDecodeError::NotSampledValues { ethertype: 0x88B8 })
        );
    }
}
