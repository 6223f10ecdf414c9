//! Feature unit: host-controlled mute and volume.
//!
//! The host adjusts playback level through class-specific control requests
//! addressed to the audio function's feature unit. [`FeatureUnit`] answers
//! them and keeps the result where the audio update can poll it, typically
//! to drive an amplifier stage with [`FeatureUnit::gain`].
//!
//! Only the master mute and volume controls are implemented. Channel and
//! entity fields are decoded but not checked.

use core::cell::Cell;

use critical_section::Mutex;
use thiserror::Error;

use crate::constants::FEATURE_MAX_VOLUME;

const REQUEST_TYPE_GET: u8 = 0xA1;
const REQUEST_TYPE_SET: u8 = 0x21;

const SET_CUR: u8 = 0x01;
const GET_CUR: u8 = 0x81;
const GET_MIN: u8 = 0x82;
const GET_MAX: u8 = 0x83;
const GET_RES: u8 = 0x84;

const MUTE_CONTROL: u8 = 0x01;
const VOLUME_CONTROL: u8 = 0x02;

/// A rejected control request. The feature state is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unsupported request type {0:#04x}")]
    RequestType(u8),
    #[error("unsupported control selector {0:#04x}")]
    Selector(u8),
    #[error("unsupported request {0:#04x}")]
    Request(u8),
    #[error("buffer of {len} bytes, {needed} needed")]
    ShortBuffer { len: usize, needed: usize },
}

/// The 8-byte SETUP stage of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub const fn from_bytes(raw: [u8; 8]) -> Self {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Channel number: 0 is the master channel.
    pub const fn channel(&self) -> u8 {
        self.value.to_le_bytes()[0]
    }

    pub const fn control_selector(&self) -> u8 {
        self.value.to_le_bytes()[1]
    }

    pub const fn interface(&self) -> u8 {
        self.index.to_le_bytes()[0]
    }

    pub const fn entity_id(&self) -> u8 {
        self.index.to_le_bytes()[1]
    }
}

/// Snapshot of the host-controlled settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub mute: bool,
    /// 0 ..= [`FEATURE_MAX_VOLUME`].
    pub volume: u16,
    /// Set by every accepted SET request, cleared by
    /// [`FeatureUnit::take_change`].
    pub change: bool,
}

impl Features {
    pub const INITIAL: Features = Features {
        mute: false,
        volume: FEATURE_MAX_VOLUME / 2,
        change: false,
    };
}

impl Default for Features {
    fn default() -> Self {
        Features::INITIAL
    }
}

pub struct FeatureUnit {
    features: Mutex<Cell<Features>>,
}

impl FeatureUnit {
    pub const fn new() -> Self {
        FeatureUnit {
            features: Mutex::new(Cell::new(Features::INITIAL)),
        }
    }

    /// Answer a GET request, writing the reply into `out`.
    ///
    /// Returns the reply length.
    pub fn get_feature(&self, setup: &SetupPacket, out: &mut [u8]) -> Result<usize, ControlError> {
        if setup.request_type != REQUEST_TYPE_GET {
            return Err(ControlError::RequestType(setup.request_type));
        }
        let current = self.features();
        match setup.control_selector() {
            MUTE_CONTROL => {
                let reply = [u8::from(current.mute)];
                write_reply(out, &reply)
            }
            VOLUME_CONTROL => {
                let value = match setup.request {
                    GET_CUR => current.volume,
                    GET_MIN => 0,
                    GET_MAX => FEATURE_MAX_VOLUME,
                    GET_RES => 1,
                    other => return Err(ControlError::Request(other)),
                };
                write_reply(out, &value.to_le_bytes())
            }
            other => Err(ControlError::Selector(other)),
        }
    }

    /// Apply a SET request carrying `data`.
    pub fn set_feature(&self, setup: &SetupPacket, data: &[u8]) -> Result<(), ControlError> {
        if setup.request_type != REQUEST_TYPE_SET {
            return Err(ControlError::RequestType(setup.request_type));
        }
        let selector = setup.control_selector();
        if selector != MUTE_CONTROL && selector != VOLUME_CONTROL {
            return Err(ControlError::Selector(selector));
        }
        if setup.request != SET_CUR {
            return Err(ControlError::Request(setup.request));
        }
        let &[first, ..] = data else {
            return Err(ControlError::ShortBuffer {
                len: data.len(),
                needed: 1,
            });
        };

        let updated = critical_section::with(|cs| {
            let cell = self.features.borrow(cs);
            let mut features = cell.get();
            if selector == MUTE_CONTROL {
                features.mute = first != 0;
            } else {
                features.volume = u16::from(first).min(FEATURE_MAX_VOLUME);
            }
            features.change = true;
            cell.set(features);
            features
        });
        log::debug!("feature unit: mute {} volume {}", updated.mute, updated.volume);
        Ok(())
    }

    pub fn features(&self) -> Features {
        critical_section::with(|cs| self.features.borrow(cs).get())
    }

    /// The current settings if the host changed them since the last call.
    pub fn take_change(&self) -> Option<Features> {
        critical_section::with(|cs| {
            let cell = self.features.borrow(cs);
            let mut features = cell.get();
            if !features.change {
                return None;
            }
            features.change = false;
            cell.set(features);
            Some(features)
        })
    }

    pub fn mute(&self) -> bool {
        self.features().mute
    }

    pub fn volume(&self) -> u16 {
        self.features().volume
    }

    /// Linear playback gain in `0.0 ..= 1.0`; zero while muted.
    pub fn gain(&self) -> f32 {
        let features = self.features();
        if features.mute {
            0.0
        } else {
            f32::from(features.volume) / f32::from(FEATURE_MAX_VOLUME)
        }
    }

    /// Back to the power-on settings.
    pub fn reset(&self) {
        critical_section::with(|cs| self.features.borrow(cs).set(Features::INITIAL));
    }
}

impl Default for FeatureUnit {
    fn default() -> Self {
        FeatureUnit::new()
    }
}

fn write_reply(out: &mut [u8], reply: &[u8]) -> Result<usize, ControlError> {
    let len = out.len();
    let dest = out.get_mut(..reply.len()).ok_or(ControlError::ShortBuffer {
        len,
        needed: reply.len(),
    })?;
    dest.copy_from_slice(reply);
    Ok(reply.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(request_type: u8, request: u8, selector: u8) -> SetupPacket {
        SetupPacket::from_bytes([request_type, request, 0, selector, 0, 2, 2, 0])
    }

    #[test]
    fn setup_fields_decode() {
        let setup = SetupPacket::from_bytes([0xA1, 0x81, 0x01, 0x02, 0x00, 0x03, 0x02, 0x00]);
        assert_eq!(setup.channel(), 1);
        assert_eq!(setup.control_selector(), VOLUME_CONTROL);
        assert_eq!(setup.interface(), 0);
        assert_eq!(setup.entity_id(), 3);
        assert_eq!(setup.length, 2);
    }

    #[test]
    fn volume_range_queries() {
        let unit = FeatureUnit::new();
        let mut out = [0u8; 4];
        let mut ask = |request| {
            let len = unit
                .get_feature(&setup(REQUEST_TYPE_GET, request, VOLUME_CONTROL), &mut out)
                .unwrap();
            assert_eq!(len, 2);
            u16::from_le_bytes([out[0], out[1]])
        };
        assert_eq!(ask(GET_CUR), FEATURE_MAX_VOLUME / 2);
        assert_eq!(ask(GET_MIN), 0);
        assert_eq!(ask(GET_MAX), FEATURE_MAX_VOLUME);
        assert_eq!(ask(GET_RES), 1);
    }

    #[test]
    fn set_then_get_round_trip() {
        let unit = FeatureUnit::new();
        unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, VOLUME_CONTROL), &[200])
            .unwrap();
        unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, MUTE_CONTROL), &[1])
            .unwrap();

        let mut out = [0u8; 2];
        let len = unit
            .get_feature(&setup(REQUEST_TYPE_GET, GET_CUR, MUTE_CONTROL), &mut out)
            .unwrap();
        assert_eq!(&out[..len], &[1]);
        assert_eq!(unit.volume(), 200);
        assert_eq!(unit.gain(), 0.0);
    }

    #[test]
    fn change_flag_is_consumed_once() {
        let unit = FeatureUnit::new();
        assert_eq!(unit.take_change(), None);

        unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, VOLUME_CONTROL), &[51])
            .unwrap();
        let change = unit.take_change().expect("pending change");
        assert_eq!(change.volume, 51);
        assert!(!change.change);
        assert_eq!(unit.take_change(), None);
        assert!((unit.gain() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn rejected_requests_leave_state_alone() {
        let unit = FeatureUnit::new();
        let mut out = [0u8; 2];

        assert_eq!(
            unit.set_feature(&setup(0x22, SET_CUR, VOLUME_CONTROL), &[9]),
            Err(ControlError::RequestType(0x22))
        );
        assert_eq!(
            unit.set_feature(&setup(REQUEST_TYPE_SET, 0x04, VOLUME_CONTROL), &[9]),
            Err(ControlError::Request(0x04))
        );
        assert_eq!(
            unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, 0x07), &[9]),
            Err(ControlError::Selector(0x07))
        );
        assert_eq!(
            unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, MUTE_CONTROL), &[]),
            Err(ControlError::ShortBuffer { len: 0, needed: 1 })
        );
        assert_eq!(
            unit.get_feature(&setup(REQUEST_TYPE_GET, 0x85, VOLUME_CONTROL), &mut out),
            Err(ControlError::Request(0x85))
        );
        assert_eq!(
            unit.get_feature(&setup(REQUEST_TYPE_GET, GET_CUR, VOLUME_CONTROL), &mut out[..1]),
            Err(ControlError::ShortBuffer { len: 1, needed: 2 })
        );

        assert_eq!(unit.features(), Features::INITIAL);
    }

    #[test]
    fn short_reply_buffer_is_rejected() {
        let unit = FeatureUnit::new();
        let mut empty = [0u8; 0];
        assert_eq!(
            unit.get_feature(&setup(REQUEST_TYPE_GET, GET_CUR, MUTE_CONTROL), &mut empty),
            Err(ControlError::ShortBuffer { len: 0, needed: 1 })
        );

        let mut exact = [0xEEu8; 2];
        assert_eq!(
            unit.get_feature(&setup(REQUEST_TYPE_GET, GET_MAX, VOLUME_CONTROL), &mut exact),
            Ok(2)
        );
        assert_eq!(u16::from_le_bytes(exact), FEATURE_MAX_VOLUME);
    }

    #[test]
    fn reset_restores_power_on_settings() {
        let unit = FeatureUnit::new();
        unit.set_feature(&setup(REQUEST_TYPE_SET, SET_CUR, MUTE_CONTROL), &[1])
            .unwrap();
        unit.reset();
        assert_eq!(unit.features(), Features::INITIAL);
        assert!((unit.gain() - 127.0 / 255.0).abs() < 1e-6);
    }
}
