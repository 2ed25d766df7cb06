// Axial hex-grid coordinates and the textual room identifier codec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A relative offset on the hexagonal grid, in axial coordinates.
///
/// Room layouts are lists of `Axial` offsets; entity positions within a
/// room use the same coordinate system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Axial {
    pub q: i32,
    pub r: i32,
}

impl Axial {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }
}

/// Identifies one room of the world, in axial coordinates.
///
/// The wire form is `"<q>;<r>"`, e.g. `"15;12"`. Parsing is strict: exactly
/// two integer components separated by a single `;`. A malformed identifier
/// never falls back to a default room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId {
    pub q: i32,
    pub r: i32,
}

impl RoomId {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub const fn as_axial(self) -> Axial {
        Axial { q: self.q, r: self.r }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomIdParseError {
    #[error("room id must have exactly two `;`-separated components, got {0}")]
    ComponentCount(usize),
    #[error("room id component {component:?} is not an integer")]
    NotAnInteger { component: String },
}

impl FromStr for RoomId {
    type Err = RoomIdParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let components: Vec<&str> = raw.split(';').collect();
        if components.len() != 2 {
            return Err(RoomIdParseError::ComponentCount(components.len()));
        }

        let parse_component = |component: &str| {
            component.trim().parse::<i32>().map_err(|_| RoomIdParseError::NotAnInteger {
                component: component.to_owned(),
            })
        };

        Ok(Self { q: parse_component(components[0])?, r: parse_component(components[1])? })
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::{RoomId, RoomIdParseError};

    #[test]
    fn parses_well_formed_room_ids() {
        assert_eq!("15;12".parse::<RoomId>(), Ok(RoomId::new(15, 12)));
        assert_eq!("-3;0".parse::<RoomId>(), Ok(RoomId::new(-3, 0)));
        assert_eq!(" 1 ; 2 ".parse::<RoomId>(), Ok(RoomId::new(1, 2)));
    }

    #[test]
    fn rejects_wrong_component_counts() {
        assert_eq!("1".parse::<RoomId>(), Err(RoomIdParseError::ComponentCount(1)));
        assert_eq!("1;2;3".parse::<RoomId>(), Err(RoomIdParseError::ComponentCount(3)));
        assert_eq!("".parse::<RoomId>(), Err(RoomIdParseError::ComponentCount(1)));
    }

    #[test]
    fn rejects_non_integer_components() {
        assert!(matches!(
            "abc".parse::<RoomId>(),
            Err(RoomIdParseError::ComponentCount(1))
        ));
        assert!(matches!(
            "a;b".parse::<RoomId>(),
            Err(RoomIdParseError::NotAnInteger { .. })
        ));
        assert!(matches!(
            "1;".parse::<RoomId>(),
            Err(RoomIdParseError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        let room = RoomId::new(-7, 42);
        assert_eq!(room.to_string().parse::<RoomId>(), Ok(room));
    }
}
