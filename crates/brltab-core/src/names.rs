// Brltab Key Name Set
// The per-device key-name universe with bidirectional sorted lookup

use std::cmp::Ordering;

use crate::key::KeyValue;
use crate::sorted::SortedVec;

/// One name in the universe.
#[derive(Debug, Clone)]
pub struct KeyNameEntry {
    pub name: String,
    pub value: KeyValue,
}

fn compare_by_name(a: &KeyNameEntry, b: &KeyNameEntry) -> Ordering {
    compare_names(&a.name, &b.name)
}

/// Key names compare case-insensitively, the way table sources write them.
fn compare_names(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().flat_map(char::to_lowercase);
    let mut bi = b.chars().flat_map(char::to_lowercase);
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// The full key-name set for a device, built once and then read-only.
///
/// Holds two sorted views over the same entries: by name for resolving
/// source operands, and by value for rendering listings. A value may carry
/// several names; the first registered one wins for display.
#[derive(Debug, Clone)]
pub struct KeyNameSet {
    by_name: SortedVec<KeyNameEntry>,
    // (value, registration order, index into display names)
    by_value: SortedVec<(KeyValue, u32, String)>,
}

impl KeyNameSet {
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (S, KeyValue)>) -> Self {
        let mut by_name = SortedVec::new(compare_by_name);
        let mut by_value: SortedVec<(KeyValue, u32, String)> =
            SortedVec::new(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut order = 0u32;
        for (name, value) in pairs {
            let name = name.into();
            if by_name
                .find_by(|entry| compare_names(&entry.name, &name))
                .is_ok()
            {
                log::warn!("duplicate key name ignored: {}", name);
                continue;
            }
            by_value.insert((value, order, name.clone()));
            by_name.insert(KeyNameEntry { name, value });
            order += 1;
        }
        Self { by_name, by_value }
    }

    /// A small generic set useful for tests and for driving the CLI
    /// without a device-specific universe: eight dots, a few chord
    /// modifiers, navigation keys in group 0, and a routing-key group.
    pub fn generic() -> Self {
        let mut pairs: Vec<(String, KeyValue)> = Vec::new();
        for dot in 0..8u8 {
            pairs.push((format!("Dot{}", dot + 1), KeyValue::new(0, dot)));
        }
        for (number, name) in [
            "Space", "Shift", "Control", "Meta", "Backward", "Forward", "Up", "Down", "Left",
            "Right", "Enter", "Escape",
        ]
        .iter()
        .enumerate()
        {
            pairs.push((name.to_string(), KeyValue::new(0, 8 + number as u8)));
        }
        pairs.push(("RoutingKey".to_string(), KeyValue::any(1)));
        Self::new(pairs)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Resolve a key name (case-insensitive) to its value.
    pub fn lookup_name(&self, name: &str) -> Option<KeyValue> {
        self.by_name
            .find_by(|entry| compare_names(&entry.name, name))
            .ok()
            .and_then(|index| self.by_name.get(index))
            .map(|entry| entry.value)
    }

    /// Whether the universe defines `name` at all.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup_name(name).is_some()
    }

    /// The display name for an exact value, if one was registered.
    pub fn lookup_value(&self, value: KeyValue) -> Option<&str> {
        self.by_value
            .find_by(|entry| entry.0.cmp(&value))
            .ok()
            .and_then(|index| self.by_value.get(index))
            .map(|entry| entry.2.as_str())
    }

    /// Format a value for display, falling back to the group wildcard name
    /// with a 1-based dotted suffix, then to raw group.number notation.
    pub fn format_value(&self, value: KeyValue) -> String {
        if let Some(name) = self.lookup_value(value) {
            return name.to_string();
        }
        if !value.is_any() {
            if let Some(group_name) = self.lookup_value(value.to_any()) {
                return format!("{}.{}", group_name, value.number as u16 + 1);
            }
        }
        value.to_string()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyNameEntry> {
        self.by_name.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyNameSet {
        KeyNameSet::new([
            ("Dot1", KeyValue::new(0, 0)),
            ("Dot2", KeyValue::new(0, 1)),
            ("Space", KeyValue::new(0, 8)),
            ("RoutingKey", KeyValue::any(1)),
        ])
    }

    #[test]
    fn test_lookup_name_case_insensitive() {
        let names = sample();
        assert_eq!(names.lookup_name("Dot1"), Some(KeyValue::new(0, 0)));
        assert_eq!(names.lookup_name("dot1"), Some(KeyValue::new(0, 0)));
        assert_eq!(names.lookup_name("SPACE"), Some(KeyValue::new(0, 8)));
        assert_eq!(names.lookup_name("NoSuchKey"), None);
    }

    #[test]
    fn test_lookup_value() {
        let names = sample();
        assert_eq!(names.lookup_value(KeyValue::new(0, 1)), Some("Dot2"));
        assert_eq!(names.lookup_value(KeyValue::any(1)), Some("RoutingKey"));
        assert_eq!(names.lookup_value(KeyValue::new(2, 0)), None);
    }

    #[test]
    fn test_format_value_dotted_fallback() {
        let names = sample();
        // A concrete routing key has no exact name; the group wildcard name
        // plus a 1-based suffix is used instead.
        assert_eq!(names.format_value(KeyValue::new(1, 6)), "RoutingKey.7");
        assert_eq!(names.format_value(KeyValue::any(1)), "RoutingKey");
        assert_eq!(names.format_value(KeyValue::new(9, 3)), "9.3");
    }

    #[test]
    fn test_first_registered_name_wins_for_display() {
        let names = KeyNameSet::new([
            ("Primary", KeyValue::new(0, 0)),
            ("Alias", KeyValue::new(0, 0)),
        ]);
        assert_eq!(names.lookup_value(KeyValue::new(0, 0)), Some("Primary"));
        // Both names still resolve.
        assert_eq!(names.lookup_name("Alias"), Some(KeyValue::new(0, 0)));
    }

    #[test]
    fn test_generic_set() {
        let names = KeyNameSet::generic();
        assert_eq!(names.lookup_name("Dot8"), Some(KeyValue::new(0, 7)));
        assert_eq!(names.lookup_name("RoutingKey"), Some(KeyValue::any(1)));
    }
}
