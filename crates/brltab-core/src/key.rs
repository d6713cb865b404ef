// Brltab Key Model
// Canonical (group, number) identifiers for physical display keys

use std::fmt;

/// Sentinel number meaning "any key in this group".
///
/// A `KeyValue` whose number is `KEY_NUMBER_ANY` stands for a whole key
/// group, e.g. every routing key above the braille cells. Searches always
/// probe the concrete number first and the group wildcard separately.
pub const KEY_NUMBER_ANY: u8 = 0xFF;

/// Upper bound on modifiers in one combination; also bounds the
/// incomplete-binding synthesis done by the compiler.
pub const MAX_MODIFIERS: usize = 10;

/// Canonical identifier for one physical key (or one whole key group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyValue {
    pub group: u8,
    pub number: u8,
}

impl KeyValue {
    pub const fn new(group: u8, number: u8) -> Self {
        Self { group, number }
    }

    /// The wildcard value covering every key in `group`.
    pub const fn any(group: u8) -> Self {
        Self {
            group,
            number: KEY_NUMBER_ANY,
        }
    }

    /// Whether this value is a group wildcard rather than a concrete key.
    pub const fn is_any(&self) -> bool {
        self.number == KEY_NUMBER_ANY
    }

    /// The group wildcard for this key's group.
    pub const fn to_any(&self) -> Self {
        Self::any(self.group)
    }

    /// Replace the wildcard number with a concrete one (dotted suffix).
    pub const fn with_number(&self, number: u8) -> Self {
        Self {
            group: self.group,
            number,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            write!(f, "{}.*", self.group)
        } else {
            write!(f, "{}.{}", self.group, self.number)
        }
    }
}
