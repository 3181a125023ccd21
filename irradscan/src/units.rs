//! Physical units used on the stage and in reconstruction.
//!
//! The library works internally in millimetres, millimetres per second and
//! millimetres per second squared. Axis calls accept an explicit unit so that
//! callers never have to remember the base unit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Elementary charge in coulomb, converts integrated beam current to particles.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Conversion from particles per mm² to particles per cm².
pub const MM2_TO_CM2: f64 = 100.0;

/// Distance unit for positions and travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Millimetres (base unit).
    #[default]
    Mm,
    /// Centimetres.
    Cm,
    /// Metres.
    M,
}

impl DistanceUnit {
    /// Number of millimetres in one of this unit.
    pub fn mm_per_unit(self) -> f64 {
        match self {
            DistanceUnit::Mm => 1.0,
            DistanceUnit::Cm => 10.0,
            DistanceUnit::M => 1e3,
        }
    }

    /// Converts a value in this unit to millimetres.
    #[inline]
    pub fn to_mm(self, value: f64) -> f64 {
        value * self.mm_per_unit()
    }

    /// Converts a value in millimetres to this unit.
    #[inline]
    pub fn from_mm(self, value_mm: f64) -> f64 {
        value_mm / self.mm_per_unit()
    }

    /// Unit symbol.
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Mm => "mm",
            DistanceUnit::Cm => "cm",
            DistanceUnit::M => "m",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mm" => Ok(DistanceUnit::Mm),
            "cm" => Ok(DistanceUnit::Cm),
            "m" => Ok(DistanceUnit::M),
            other => Err(UnitParseError(other.to_string())),
        }
    }
}

/// Speed unit for axis velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    /// Millimetres per second (base unit).
    #[default]
    #[serde(rename = "mm/s")]
    MmPerS,
    /// Centimetres per second.
    #[serde(rename = "cm/s")]
    CmPerS,
    /// Metres per second.
    #[serde(rename = "m/s")]
    MPerS,
}

impl SpeedUnit {
    /// Converts a value in this unit to mm/s.
    #[inline]
    pub fn to_mm_per_s(self, value: f64) -> f64 {
        value * self.distance().mm_per_unit()
    }

    /// Converts a value in mm/s to this unit.
    #[inline]
    pub fn from_mm_per_s(self, value: f64) -> f64 {
        value / self.distance().mm_per_unit()
    }

    fn distance(self) -> DistanceUnit {
        match self {
            SpeedUnit::MmPerS => DistanceUnit::Mm,
            SpeedUnit::CmPerS => DistanceUnit::Cm,
            SpeedUnit::MPerS => DistanceUnit::M,
        }
    }

    /// Unit symbol.
    pub fn as_str(self) -> &'static str {
        match self {
            SpeedUnit::MmPerS => "mm/s",
            SpeedUnit::CmPerS => "cm/s",
            SpeedUnit::MPerS => "m/s",
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mm/s" => Ok(SpeedUnit::MmPerS),
            "cm/s" => Ok(SpeedUnit::CmPerS),
            "m/s" => Ok(SpeedUnit::MPerS),
            other => Err(UnitParseError(other.to_string())),
        }
    }
}

/// Unknown unit symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit '{0}'")]
pub struct UnitParseError(pub String);
