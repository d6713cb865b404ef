// Brltab Key Combination
// A set of modifier keys plus an optional immediate key

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use crate::key::{KeyValue, MAX_MODIFIERS};
use crate::names::KeyNameSet;

/// Errors building a combination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComboError {
    #[error("duplicate key in combination")]
    DuplicateKey,
    #[error("too many modifiers in combination (limit {MAX_MODIFIERS})")]
    TooManyModifiers,
}

/// An immutable key combination.
///
/// The modifier keys are stored twice: in authored order for display, and
/// sorted for comparison. The optional immediate key is the one whose
/// press completes the combination; a combination without one matches as
/// all-modifiers (used for modifier-only bindings and for the synthesized
/// partial-chord entries).
#[derive(Debug, Clone)]
pub struct KeyCombination {
    authored: SmallVec<[KeyValue; 4]>,
    sorted: SmallVec<[KeyValue; 4]>,
    immediate: Option<KeyValue>,
}

impl KeyCombination {
    pub fn new(
        modifiers: impl IntoIterator<Item = KeyValue>,
        immediate: Option<KeyValue>,
    ) -> Result<Self, ComboError> {
        let authored: SmallVec<[KeyValue; 4]> = modifiers.into_iter().collect();
        if authored.len() > MAX_MODIFIERS {
            return Err(ComboError::TooManyModifiers);
        }
        let mut sorted = authored.clone();
        sorted.sort();
        if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ComboError::DuplicateKey);
        }
        if let Some(key) = immediate {
            if sorted.contains(&key) {
                return Err(ComboError::DuplicateKey);
            }
        }
        Ok(Self {
            authored,
            sorted,
            immediate,
        })
    }

    /// A combination of exactly one immediate key.
    pub fn single(key: KeyValue) -> Self {
        Self {
            authored: SmallVec::new(),
            sorted: SmallVec::new(),
            immediate: Some(key),
        }
    }

    /// A modifier-only combination from an already sorted, deduplicated
    /// key set. Used by the compiler's finish pass and the runtime search,
    /// both of which work from sorted pressed-key sets.
    pub fn modifiers_only(sorted: impl IntoIterator<Item = KeyValue>) -> Self {
        let sorted: SmallVec<[KeyValue; 4]> = sorted.into_iter().collect();
        debug_assert!(sorted.windows(2).all(|pair| pair[0] < pair[1]));
        Self {
            authored: sorted.clone(),
            sorted,
            immediate: None,
        }
    }

    /// A search probe from an already sorted, deduplicated modifier set
    /// and an optional immediate key. Used by the runtime matcher.
    pub(crate) fn search_probe(
        sorted: SmallVec<[KeyValue; 4]>,
        immediate: Option<KeyValue>,
    ) -> Self {
        debug_assert!(sorted.windows(2).all(|pair| pair[0] < pair[1]));
        Self {
            authored: sorted.clone(),
            sorted,
            immediate,
        }
    }

    /// Modifier keys in authored order.
    pub fn modifiers(&self) -> &[KeyValue] {
        &self.authored
    }

    /// Modifier keys in comparison order.
    pub fn sorted_modifiers(&self) -> &[KeyValue] {
        &self.sorted
    }

    pub fn immediate(&self) -> Option<KeyValue> {
        self.immediate
    }

    /// Total number of keys, immediate included.
    pub fn key_count(&self) -> usize {
        self.sorted.len() + usize::from(self.immediate.is_some())
    }

    /// How many of the combination's keys are group wildcards.
    pub fn any_key_count(&self) -> usize {
        self.sorted.iter().filter(|key| key.is_any()).count()
            + usize::from(self.immediate.is_some_and(|key| key.is_any()))
    }

    pub fn contains(&self, key: KeyValue) -> bool {
        self.sorted.binary_search(&key).is_ok() || self.immediate == Some(key)
    }

    /// Render using the given name set, in authored order, with the
    /// immediate key last and marked with a leading '!'. The output parses
    /// back to an equal combination for any keys the name set defines.
    pub fn format(&self, names: &KeyNameSet) -> String {
        let mut parts: Vec<String> = self
            .authored
            .iter()
            .map(|key| names.format_value(*key))
            .collect();
        if let Some(key) = self.immediate {
            parts.push(format!("!{}", names.format_value(key)));
        }
        parts.join("+")
    }
}

impl PartialEq for KeyCombination {
    fn eq(&self, other: &Self) -> bool {
        self.sorted == other.sorted && self.immediate == other.immediate
    }
}

impl Eq for KeyCombination {}

impl PartialOrd for KeyCombination {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyCombination {
    /// Sorted modifier set first, then immediate-key state, then any-key
    /// count with concrete combinations ordering first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.sorted
            .as_slice()
            .cmp(other.sorted.as_slice())
            .then_with(|| self.immediate.cmp(&other.immediate))
            .then_with(|| self.any_key_count().cmp(&other.any_key_count()))
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for key in &self.authored {
            if !first {
                write!(f, "+")?;
            }
            write!(f, "{}", key)?;
            first = false;
        }
        if let Some(key) = self.immediate {
            if !first {
                write!(f, "+")?;
            }
            write!(f, "!{}", key)?;
        }
        Ok(())
    }
}
