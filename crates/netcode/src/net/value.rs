use std::f64::consts::{PI, TAU};

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::protocol::WireError;
use crate::snapshot::interp::{Interp, clamp_angle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Precision {
    Float64,
    #[default]
    Float32,
    Int16,
    UInt8,
}

impl Precision {
    pub fn code(self) -> u8 {
        match self {
            Precision::Float64 => 0,
            Precision::Float32 => 1,
            Precision::Int16 => 2,
            Precision::UInt8 => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Precision::Float64),
            1 => Some(Precision::Float32),
            2 => Some(Precision::Int16),
            3 => Some(Precision::UInt8),
            _ => None,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            Precision::Float64 => 8,
            Precision::Float32 => 4,
            Precision::Int16 => 2,
            Precision::UInt8 => 1,
        }
    }
}

impl TryFrom<u8> for Precision {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Precision::from_code(code).ok_or_else(|| format!("unknown precision {code}"))
    }
}

impl From<Precision> for u8 {
    fn from(precision: Precision) -> u8 {
        precision.code()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetValue {
    pub tag: String,
    pub precision: Precision,
    pub interp: Interp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdata: Option<f64>,
    #[serde(
        default,
        rename = "clientvaluetag",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_value_tag: Option<String>,
}

impl NetValue {
    pub fn new(tag: impl Into<String>, precision: Precision, interp: Interp) -> Self {
        Self {
            tag: tag.into(),
            precision,
            interp,
            userdata: None,
            client_value_tag: None,
        }
    }

    pub fn with_userdata(mut self, userdata: f64) -> Self {
        self.userdata = Some(userdata);
        self
    }

    pub fn with_client_value_tag(mut self, tag: impl Into<String>) -> Self {
        self.client_value_tag = Some(tag.into());
        self
    }

    pub fn is_angular(&self) -> bool {
        self.interp == Interp::Angular
    }

    pub fn quantize(&self, value: f64) -> f64 {
        quantize(value, self.precision, self.interp)
    }

    pub fn dequantize(&self, raw: f64) -> f64 {
        dequantize(raw, self.precision, self.interp)
    }

    pub fn write<B: BufMut>(&self, buf: &mut B, value: f64) {
        let q = self.quantize(value);
        match self.precision {
            Precision::Float64 => buf.put_f64(q),
            Precision::Float32 => buf.put_f32(q as f32),
            Precision::Int16 => buf.put_i16(q as i16),
            Precision::UInt8 => buf.put_u8(q as u8),
        }
    }

    pub fn read<B: Buf>(&self, buf: &mut B) -> Result<f64, WireError> {
        if buf.remaining() < self.precision.byte_size() {
            return Err(WireError::UnexpectedEof);
        }
        let raw = match self.precision {
            Precision::Float64 => buf.get_f64(),
            Precision::Float32 => buf.get_f32() as f64,
            Precision::Int16 => buf.get_i16() as f64,
            Precision::UInt8 => buf.get_u8() as f64,
        };
        Ok(self.dequantize(raw))
    }
}

pub fn schema_byte_size(schema: &[NetValue]) -> usize {
    schema.iter().map(|v| v.precision.byte_size()).sum()
}

pub fn quantize(value: f64, precision: Precision, interp: Interp) -> f64 {
    let angular = interp == Interp::Angular;
    match precision {
        Precision::Float64 => value,
        Precision::Float32 => value as f32 as f64,
        Precision::Int16 => {
            let v = if angular {
                (clamp_angle(value) / PI - 1.0) * 32767.0
            } else {
                value
            };
            saturate(v, -32768.0, 32767.0)
        }
        Precision::UInt8 => {
            let v = if angular {
                clamp_angle(value) / TAU * 255.0
            } else {
                value
            };
            saturate(v, 0.0, 255.0)
        }
    }
}

fn saturate(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.trunc().clamp(lo, hi)
}

pub fn dequantize(raw: f64, precision: Precision, interp: Interp) -> f64 {
    if interp != Interp::Angular {
        return raw;
    }
    match precision {
        Precision::Int16 => (raw / 32767.0 + 1.0) * PI,
        Precision::UInt8 => raw / 255.0 * TAU,
        Precision::Float64 | Precision::Float32 => raw,
    }
}
