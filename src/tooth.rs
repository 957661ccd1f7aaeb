//! Tooth classification in FDI notation.
//!
//! A `ToothId` can only be built from a number inside the permanent
//! (11–48) or primary (51–85) FDI ranges, so every other module can
//! classify without re-validating. Quadrant and anatomical type are
//! derived on demand, never stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid FDI tooth number: {0}")]
pub struct InvalidToothError(pub u32);

// ═══════════════════════════════════════════
// Types
// ═══════════════════════════════════════════

/// Quadrant of the dentition, numbered as in FDI (1 = upper right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    UpperRight,
    UpperLeft,
    LowerLeft,
    LowerRight,
}

impl Quadrant {
    pub fn number(&self) -> u8 {
        match self {
            Quadrant::UpperRight => 1,
            Quadrant::UpperLeft => 2,
            Quadrant::LowerLeft => 3,
            Quadrant::LowerRight => 4,
        }
    }

    fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Quadrant::UpperRight),
            2 => Some(Quadrant::UpperLeft),
            3 => Some(Quadrant::LowerLeft),
            4 => Some(Quadrant::LowerRight),
            _ => None,
        }
    }

    pub fn is_upper(&self) -> bool {
        matches!(self, Quadrant::UpperRight | Quadrant::UpperLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToothType {
    Anterior,
    Premolar,
    Molar,
}

/// Derived classification of a tooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToothClass {
    pub quadrant: Quadrant,
    pub tooth_type: ToothType,
    pub is_primary: bool,
}

/// A validated FDI tooth number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ToothId(u8);

// ═══════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════

/// Classify a raw FDI number. Fails outside the permanent/primary ranges.
pub fn classify(number: u8) -> Result<ToothClass, InvalidToothError> {
    ToothId::new(number).map(|tooth| tooth.classify())
}

impl ToothId {
    pub fn new(number: u8) -> Result<Self, InvalidToothError> {
        if is_valid_fdi(number) {
            Ok(ToothId(number))
        } else {
            Err(InvalidToothError(u32::from(number)))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Position inside the quadrant, 1 (central incisor) to 8 (third molar).
    pub fn position(&self) -> u8 {
        self.0 % 10
    }

    pub fn is_primary(&self) -> bool {
        self.0 >= 50
    }

    pub fn quadrant(&self) -> Quadrant {
        let digit = self.0 / 10;
        let digit = if digit > 4 { digit - 4 } else { digit };
        // Construction guarantees the digit is 1..=8.
        Quadrant::from_number(digit).unwrap_or(Quadrant::UpperRight)
    }

    pub fn tooth_type(&self) -> ToothType {
        let pos = self.position();
        if self.is_primary() {
            // Primary dentition has no premolars; 4 and 5 are the deciduous molars.
            return if pos >= 4 {
                ToothType::Molar
            } else {
                ToothType::Anterior
            };
        }
        match pos {
            6..=8 => ToothType::Molar,
            4 | 5 => ToothType::Premolar,
            _ => ToothType::Anterior,
        }
    }

    pub fn classify(&self) -> ToothClass {
        ToothClass {
            quadrant: self.quadrant(),
            tooth_type: self.tooth_type(),
            is_primary: self.is_primary(),
        }
    }

    pub fn is_molar(&self) -> bool {
        self.tooth_type() == ToothType::Molar
    }

    /// Neighbour at a signed FDI offset within the same quadrant, if it exists.
    pub fn offset(&self, delta: i8) -> Option<ToothId> {
        let target = i16::from(self.0) + i16::from(delta);
        let target = u8::try_from(target).ok()?;
        if target / 10 != self.0 / 10 {
            return None;
        }
        ToothId::new(target).ok()
    }

    /// Sort key following the chart layout: upper arch right to left,
    /// then lower arch right to left, permanent before primary.
    pub fn chart_order(&self) -> (bool, bool, i8) {
        let pos = self.position() as i8;
        let x = match self.quadrant() {
            Quadrant::UpperRight | Quadrant::LowerRight => -pos,
            Quadrant::UpperLeft | Quadrant::LowerLeft => pos,
        };
        (self.is_primary(), !self.quadrant().is_upper(), x)
    }

    /// Every permanent tooth, quadrant by quadrant.
    pub fn permanent() -> impl Iterator<Item = ToothId> {
        (1..=4u8).flat_map(|q| (1..=8u8).map(move |p| ToothId(q * 10 + p)))
    }

    /// Every primary tooth, quadrant by quadrant.
    pub fn primary() -> impl Iterator<Item = ToothId> {
        (5..=8u8).flat_map(|q| (1..=5u8).map(move |p| ToothId(q * 10 + p)))
    }

    /// The full valid tooth set (permanent then primary).
    pub fn all() -> impl Iterator<Item = ToothId> {
        Self::permanent().chain(Self::primary())
    }
}

fn is_valid_fdi(number: u8) -> bool {
    let quadrant = number / 10;
    let pos = number % 10;
    match quadrant {
        1..=4 => (1..=8).contains(&pos),
        5..=8 => (1..=5).contains(&pos),
        _ => false,
    }
}

impl TryFrom<u8> for ToothId {
    type Error = InvalidToothError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ToothId::new(value)
    }
}

impl TryFrom<u32> for ToothId {
    type Error = InvalidToothError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidToothError(value))
            .and_then(ToothId::new)
    }
}

impl From<ToothId> for u8 {
    fn from(tooth: ToothId) -> Self {
        tooth.0
    }
}

impl FromStr for ToothId {
    type Err = InvalidToothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s.trim().parse().map_err(|_| InvalidToothError(0))?;
        ToothId::try_from(n)
    }
}

impl fmt::Display for ToothId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
