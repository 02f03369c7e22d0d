//! # Unit Converter
//!
//! Measurement units for quantity takeoff and the conversion table between
//! them. Conversion is stateless: every unit carries a factor to the SI base
//! of its family (metre, square metre, cubic metre, or a plain count), and
//! converting is a multiply followed by a divide.
//!
//! ## Families
//!
//! - Length: `mm`, `cm`, `m`, `km`, `in`, `ft`, `yd`
//! - Area: `mm2`, `cm2`, `m2`, `ha`, `in2`, `ft2`, `yd2`
//! - Volume: `mm3`, `cm3`, `m3`, `l`, `in3`, `ft3`, `yd3`
//! - Count: `nr`
//!
//! Converting across families (a length into an area, say) is a
//! [`CalcError::Unit`].
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::units::{convert, Unit};
//!
//! let m = convert(1200.0, Unit::Millimetre, Unit::Metre).unwrap();
//! assert!((m - 1.2).abs() < 1e-12);
//!
//! let unit: Unit = "m³".parse().unwrap();
//! assert_eq!(unit, Unit::CubicMetre);
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};

// ============================================================================
// Unit Families
// ============================================================================

/// Dimension a unit measures. Only units of the same family convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    Length,
    Area,
    Volume,
    Count,
}

impl UnitFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            UnitFamily::Length => "length",
            UnitFamily::Area => "area",
            UnitFamily::Volume => "volume",
            UnitFamily::Count => "count",
        }
    }

    /// The SI unit every member of the family converts through
    pub fn base_unit(&self) -> Unit {
        match self {
            UnitFamily::Length => Unit::Metre,
            UnitFamily::Area => Unit::SquareMetre,
            UnitFamily::Volume => Unit::CubicMetre,
            UnitFamily::Count => Unit::Number,
        }
    }
}

// ============================================================================
// Units
// ============================================================================

/// A measurement unit. Serializes as its short symbol (`"m3"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    // Length
    Millimetre,
    Centimetre,
    Metre,
    Kilometre,
    Inch,
    Foot,
    Yard,
    // Area
    SquareMillimetre,
    SquareCentimetre,
    SquareMetre,
    Hectare,
    SquareInch,
    SquareFoot,
    SquareYard,
    // Volume
    CubicMillimetre,
    CubicCentimetre,
    CubicMetre,
    Litre,
    CubicInch,
    CubicFoot,
    CubicYard,
    // Count
    Number,
}

const INCH_M: f64 = 0.0254;
const FOOT_M: f64 = 0.3048;
const YARD_M: f64 = 0.9144;

impl Unit {
    pub const ALL: [Unit; 22] = [
        Unit::Millimetre,
        Unit::Centimetre,
        Unit::Metre,
        Unit::Kilometre,
        Unit::Inch,
        Unit::Foot,
        Unit::Yard,
        Unit::SquareMillimetre,
        Unit::SquareCentimetre,
        Unit::SquareMetre,
        Unit::Hectare,
        Unit::SquareInch,
        Unit::SquareFoot,
        Unit::SquareYard,
        Unit::CubicMillimetre,
        Unit::CubicCentimetre,
        Unit::CubicMetre,
        Unit::Litre,
        Unit::CubicInch,
        Unit::CubicFoot,
        Unit::CubicYard,
        Unit::Number,
    ];

    /// Short symbol used in formulas, files and reports
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Millimetre => "mm",
            Unit::Centimetre => "cm",
            Unit::Metre => "m",
            Unit::Kilometre => "km",
            Unit::Inch => "in",
            Unit::Foot => "ft",
            Unit::Yard => "yd",
            Unit::SquareMillimetre => "mm2",
            Unit::SquareCentimetre => "cm2",
            Unit::SquareMetre => "m2",
            Unit::Hectare => "ha",
            Unit::SquareInch => "in2",
            Unit::SquareFoot => "ft2",
            Unit::SquareYard => "yd2",
            Unit::CubicMillimetre => "mm3",
            Unit::CubicCentimetre => "cm3",
            Unit::CubicMetre => "m3",
            Unit::Litre => "l",
            Unit::CubicInch => "in3",
            Unit::CubicFoot => "ft3",
            Unit::CubicYard => "yd3",
            Unit::Number => "nr",
        }
    }

    pub fn family(&self) -> UnitFamily {
        match self {
            Unit::Millimetre
            | Unit::Centimetre
            | Unit::Metre
            | Unit::Kilometre
            | Unit::Inch
            | Unit::Foot
            | Unit::Yard => UnitFamily::Length,
            Unit::SquareMillimetre
            | Unit::SquareCentimetre
            | Unit::SquareMetre
            | Unit::Hectare
            | Unit::SquareInch
            | Unit::SquareFoot
            | Unit::SquareYard => UnitFamily::Area,
            Unit::CubicMillimetre
            | Unit::CubicCentimetre
            | Unit::CubicMetre
            | Unit::Litre
            | Unit::CubicInch
            | Unit::CubicFoot
            | Unit::CubicYard => UnitFamily::Volume,
            Unit::Number => UnitFamily::Count,
        }
    }

    /// Multiplier from this unit to its family's base unit
    pub fn to_base_factor(&self) -> f64 {
        match self {
            Unit::Millimetre => 1e-3,
            Unit::Centimetre => 1e-2,
            Unit::Metre => 1.0,
            Unit::Kilometre => 1e3,
            Unit::Inch => INCH_M,
            Unit::Foot => FOOT_M,
            Unit::Yard => YARD_M,
            Unit::SquareMillimetre => 1e-6,
            Unit::SquareCentimetre => 1e-4,
            Unit::SquareMetre => 1.0,
            Unit::Hectare => 1e4,
            Unit::SquareInch => INCH_M * INCH_M,
            Unit::SquareFoot => FOOT_M * FOOT_M,
            Unit::SquareYard => YARD_M * YARD_M,
            Unit::CubicMillimetre => 1e-9,
            Unit::CubicCentimetre => 1e-6,
            Unit::CubicMetre => 1.0,
            Unit::Litre => 1e-3,
            Unit::CubicInch => INCH_M * INCH_M * INCH_M,
            Unit::CubicFoot => FOOT_M * FOOT_M * FOOT_M,
            Unit::CubicYard => YARD_M * YARD_M * YARD_M,
            Unit::Number => 1.0,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Accepted spellings, lowercased, mapped to their unit.
static ALIASES: Lazy<HashMap<&'static str, Unit>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for unit in Unit::ALL {
        map.insert(unit.symbol(), unit);
    }
    let extra: [(&str, Unit); 33] = [
        ("millimetre", Unit::Millimetre),
        ("millimeter", Unit::Millimetre),
        ("metre", Unit::Metre),
        ("meter", Unit::Metre),
        ("lm", Unit::Metre),
        ("inch", Unit::Inch),
        ("feet", Unit::Foot),
        ("foot", Unit::Foot),
        ("mm²", Unit::SquareMillimetre),
        ("cm²", Unit::SquareCentimetre),
        ("m²", Unit::SquareMetre),
        ("sqm", Unit::SquareMetre),
        ("sq m", Unit::SquareMetre),
        ("in²", Unit::SquareInch),
        ("ft²", Unit::SquareFoot),
        ("sqft", Unit::SquareFoot),
        ("sq ft", Unit::SquareFoot),
        ("yd²", Unit::SquareYard),
        ("mm³", Unit::CubicMillimetre),
        ("cm³", Unit::CubicCentimetre),
        ("m³", Unit::CubicMetre),
        ("cum", Unit::CubicMetre),
        ("cu m", Unit::CubicMetre),
        ("litre", Unit::Litre),
        ("liter", Unit::Litre),
        ("in³", Unit::CubicInch),
        ("ft³", Unit::CubicFoot),
        ("cu ft", Unit::CubicFoot),
        ("yd³", Unit::CubicYard),
        ("cu yd", Unit::CubicYard),
        ("no", Unit::Number),
        ("each", Unit::Number),
        ("item", Unit::Number),
    ];
    map.extend(extra);
    map
});

impl FromStr for Unit {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        ALIASES
            .get(key.as_str())
            .copied()
            .ok_or_else(|| CalcError::unit(s, "?", "unknown unit"))
    }
}

impl TryFrom<String> for Unit {
    type Error = CalcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert `value` expressed in `from` into `to`.
///
/// Returns [`CalcError::Unit`] when the units measure different things.
pub fn convert(value: f64, from: Unit, to: Unit) -> CalcResult<f64> {
    if from == to {
        return Ok(value);
    }
    if from.family() != to.family() {
        return Err(CalcError::unit(
            from.symbol(),
            to.symbol(),
            format!(
                "{} and {} are not convertible",
                from.family().display_name(),
                to.family().display_name()
            ),
        ));
    }
    Ok(value * from.to_base_factor() / to.to_base_factor())
}

/// Convert between units given by name, e.g. `convert_named(2.0, "ft", "mm")`.
pub fn convert_named(value: f64, from: &str, to: &str) -> CalcResult<f64> {
    let from_unit: Unit = from.parse().map_err(|_| CalcError::unit(from, to, format!("unknown unit '{}'", from)))?;
    let to_unit: Unit = to.parse().map_err(|_| CalcError::unit(from, to, format!("unknown unit '{}'", to)))?;
    convert(value, from_unit, to_unit)
}
