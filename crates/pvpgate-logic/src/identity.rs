//! Participant identities and block positions.
//!
//! Identities are opaque 128-bit values rendered in the canonical hyphenated
//! form (`8-4-4-4-12` lowercase hex) used as persisted keys. Positions are
//! integer block coordinates within a named world.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, opaque identity of a tracked participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(u128);

impl ParticipantId {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

/// Lengths of the five hex groups in the canonical form.
const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// Why a persisted key could not be read back as an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    #[error("expected 36 characters, found {0}")]
    Length(usize),
    #[error("expected 5 hyphen-separated groups")]
    Grouping,
    #[error("invalid hex digit {0:?}")]
    Digit(char),
}

impl FromStr for ParticipantId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 36 {
            return Err(ParseIdError::Length(s.len()));
        }
        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != GROUPS.len()
            || groups.iter().zip(GROUPS).any(|(g, len)| g.len() != len)
        {
            return Err(ParseIdError::Grouping);
        }

        let mut value: u128 = 0;
        for c in groups.concat().chars() {
            let digit = c.to_digit(16).ok_or(ParseIdError::Digit(c))?;
            value = (value << 4) | digit as u128;
        }
        Ok(Self(value))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff,
        )
    }
}

/// Integer block position inside a named world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Block containing an exact (fractional) position; each axis is floored.
    pub fn from_exact(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self::new(world, x.floor() as i32, y.floor() as i32, z.floor() as i32)
    }

    /// True when both positions name the same block of the same world.
    pub fn same_block(&self, other: &BlockPos) -> bool {
        self == other
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_roundtrip() {
        let id = ParticipantId::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        let text = id.to_string();
        assert_eq!(text, "01234567-89ab-cdef-0011-223344556677");
        assert_eq!(text.parse::<ParticipantId>(), Ok(id));
    }

    #[test]
    fn test_id_parse_accepts_uppercase() {
        let id: ParticipantId = "01234567-89AB-CDEF-0011-223344556677".parse().unwrap();
        assert_eq!(id.as_u128(), 0x0123_4567_89ab_cdef_0011_2233_4455_6677);
    }

    #[test]
    fn test_id_parse_rejects_malformed() {
        assert_eq!("not-a-uuid".parse::<ParticipantId>(), Err(ParseIdError::Length(10)));
        assert_eq!(
            "0123456789ab-cdef-0011-2233-44556677".parse::<ParticipantId>(),
            Err(ParseIdError::Grouping)
        );
        assert_eq!(
            "0123456g-89ab-cdef-0011-223344556677".parse::<ParticipantId>(),
            Err(ParseIdError::Digit('g'))
        );
    }

    #[test]
    fn test_from_exact_floors_negative_coordinates() {
        let pos = BlockPos::from_exact("world", -0.5, 64.9, 10.0);
        assert_eq!(pos, BlockPos::new("world", -1, 64, 10));
    }
}
