//! Self-describing payload values.
//!
//! Every payload field on the wire is a CBOR item: value ids, configuration
//! records, error messages, log lines and blackbox records. CBOR items are
//! self-delimiting, so a payload holding several items is read one item at a
//! time from a byte cursor with [`read_next`].

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identifies which configuration value a Get or Set targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueId {
    Invalid = 0,
    Info = 1,
    Profile = 2,
    DefaultProfile = 3,
    BlackboxRate = 4,
    PidRatePresets = 5,
    VtxSettings = 6,
    OsdFont = 7,
}

impl ValueId {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ValueId::Invalid),
            1 => Some(ValueId::Info),
            2 => Some(ValueId::Profile),
            3 => Some(ValueId::DefaultProfile),
            4 => Some(ValueId::BlackboxRate),
            5 => Some(ValueId::PidRatePresets),
            6 => Some(ValueId::VtxSettings),
            7 => Some(ValueId::OsdFont),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ValueId {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_u8(raw).ok_or(ProtocolError::UnknownValueId(raw))
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueId::Invalid => write!(f, "INVALID"),
            ValueId::Info => write!(f, "INFO"),
            ValueId::Profile => write!(f, "PROFILE"),
            ValueId::DefaultProfile => write!(f, "DEFAULT_PROFILE"),
            ValueId::BlackboxRate => write!(f, "BLACKBOX_RATE"),
            ValueId::PidRatePresets => write!(f, "PID_RATE_PRESETS"),
            ValueId::VtxSettings => write!(f, "VTX_SETTINGS"),
            ValueId::OsdFont => write!(f, "OSD_FONT"),
        }
    }
}

// On the wire a value id is a plain CBOR unsigned integer.
impl Serialize for ValueId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ValueId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        ValueId::from_u8(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown value id {raw}")))
    }
}

/// Encodes a value as a single CBOR item.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    append(&mut buf, value)?;
    Ok(buf)
}

/// Appends a CBOR item to `buf`.
pub fn append<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> Result<(), ProtocolError> {
    ciborium::into_writer(value, buf).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes the first CBOR item of `bytes`, ignoring anything after it.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let mut cursor = bytes;
    read_next(&mut cursor)
}

/// Decodes one CBOR item from the front of `cursor` and advances it past the
/// item.
pub fn read_next<T: DeserializeOwned>(cursor: &mut &[u8]) -> Result<T, ProtocolError> {
    ciborium::from_reader(cursor).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// A telemetry record streamed by the device while blackbox logging is on.
///
/// The record layout belongs to the firmware, so it is kept as a generic CBOR
/// value and deserialized into a caller type on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct BlackboxRecord(ciborium::Value);

impl BlackboxRecord {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        from_slice(payload).map(Self)
    }

    pub fn from_value(value: ciborium::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &ciborium::Value {
        &self.0
    }

    pub fn into_value(self) -> ciborium::Value {
        self.0
    }

    /// Deserializes the record into a typed structure.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.0
            .deserialized()
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
