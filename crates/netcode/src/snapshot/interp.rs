use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Interp {
    #[default]
    None,
    Linear,
    Angular,
}

impl Interp {
    pub fn code(self) -> u8 {
        match self {
            Interp::None => 0,
            Interp::Linear => 1,
            Interp::Angular => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Interp::None),
            1 => Some(Interp::Linear),
            2 => Some(Interp::Angular),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Interp {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Interp::from_code(code).ok_or_else(|| format!("unknown interpolation mode {code}"))
    }
}

impl From<Interp> for u8 {
    fn from(mode: Interp) -> u8 {
        mode.code()
    }
}

#[inline]
pub fn lerp(a: f64, b: f64, x: f64) -> f64 {
    a + (b - a) * x
}

#[inline]
pub fn unlerp(a: f64, b: f64, c: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    (c - a) / (b - a)
}

pub fn clamp_angle(a: f64) -> f64 {
    let r = a.rem_euclid(TAU);
    if r >= TAU { 0.0 } else { r }
}

pub fn angle_diff(a: f64, b: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let dot = a.sin() * b.sin() + a.cos() * b.cos();
    if dot >= 1.0 {
        0.0
    } else if dot <= -1.0 {
        PI
    } else {
        dot.acos()
    }
}

pub fn angle_clockwise(a: f64, b: f64) -> bool {
    a.cos() * b.sin() - a.sin() * b.cos() <= 0.0
}

pub fn angle_lerp(a: f64, b: f64, x: f64) -> f64 {
    let diff = angle_diff(a, b);
    let r = if angle_clockwise(b, a) {
        a + diff * x
    } else {
        a - diff * x
    };
    clamp_angle(r)
}

/// Blends two field values according to the interpolation mode.
///
/// With `Interp::None` the older value is held, unless the caller is
/// projecting past the newer sample, in which case the newer value wins.
pub fn blend(mode: Interp, from: f64, to: f64, x: f64, extrapolating: bool) -> f64 {
    match mode {
        Interp::None => {
            if extrapolating {
                to
            } else {
                from
            }
        }
        Interp::Linear => lerp(from, to, x),
        Interp::Angular => angle_lerp(from, to, x),
    }
}
