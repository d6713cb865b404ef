// Brltab Key Context
// Per-context binding, hotkey, and mapped-key tables

use std::cmp::Ordering;

use strum_macros::{Display, EnumString};

use crate::combo::KeyCombination;
use crate::command::BoundCommand;
use crate::key::KeyValue;
use crate::sorted::SortedVec;

/// Index of the built-in default context.
pub const CTX_DEFAULT: usize = 0;
/// Index of the built-in menu context.
pub const CTX_MENU: usize = 1;

/// A key combination bound to a command, plus an optional long-press
/// command.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub combination: KeyCombination,
    pub primary: BoundCommand,
    pub secondary: Option<BoundCommand>,
    /// Authored under `hide on`; skipped by the listing pass.
    pub hidden: bool,
    /// A later entry equal to an earlier one; flagged for the audit pass
    /// rather than dropped.
    pub duplicate: bool,
}

impl KeyBinding {
    pub fn new(combination: KeyCombination, primary: BoundCommand) -> Self {
        Self {
            combination,
            primary,
            secondary: None,
            hidden: false,
            duplicate: false,
        }
    }

    /// A synthesized partial-chord entry carrying the incomplete sentinel.
    pub fn incomplete(combination: KeyCombination) -> Self {
        Self::new(combination, BoundCommand::incomplete())
    }

    pub fn is_incomplete(&self) -> bool {
        self.primary.is_incomplete()
    }
}

pub fn compare_bindings(a: &KeyBinding, b: &KeyBinding) -> Ordering {
    a.combination.cmp(&b.combination)
}

/// A key that fires commands on press and release regardless of any other
/// keys currently held.
#[derive(Debug, Clone)]
pub struct HotkeyEntry {
    pub key: KeyValue,
    pub press: Option<BoundCommand>,
    pub release: Option<BoundCommand>,
    pub duplicate: bool,
}

pub fn compare_hotkeys(a: &HotkeyEntry, b: &HotkeyEntry) -> Ordering {
    a.key.cmp(&b.key)
}

/// Semantic function a key contributes when typing on the braille
/// keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum KeyboardFunction {
    Dot1,
    Dot2,
    Dot3,
    Dot4,
    Dot5,
    Dot6,
    Dot7,
    Dot8,
    Space,
    Shift,
    Uppercase,
    Control,
    Meta,
}

impl KeyboardFunction {
    /// The bit this function contributes to a chord. Dots occupy the low
    /// eight bits, matching the PASSDOTS argument layout.
    pub fn bit(&self) -> u16 {
        match self {
            KeyboardFunction::Dot1 => 1 << 0,
            KeyboardFunction::Dot2 => 1 << 1,
            KeyboardFunction::Dot3 => 1 << 2,
            KeyboardFunction::Dot4 => 1 << 3,
            KeyboardFunction::Dot5 => 1 << 4,
            KeyboardFunction::Dot6 => 1 << 5,
            KeyboardFunction::Dot7 => 1 << 6,
            KeyboardFunction::Dot8 => 1 << 7,
            KeyboardFunction::Space => 0,
            KeyboardFunction::Shift => 1 << 8,
            KeyboardFunction::Uppercase => 1 << 9,
            KeyboardFunction::Control => 1 << 10,
            KeyboardFunction::Meta => 1 << 11,
        }
    }

    /// The dot bits of a chord mask (the PASSDOTS argument).
    pub const DOT_MASK: u16 = 0x00FF;
    /// The input-modifier bits of a chord mask (shifted into FLG byte).
    pub const MODIFIER_MASK: u16 = 0x0F00;
}

/// A physical key mapped to a keyboard function.
#[derive(Debug, Clone)]
pub struct MappedKeyEntry {
    pub key: KeyValue,
    pub function: KeyboardFunction,
    pub duplicate: bool,
}

pub fn compare_mapped_keys(a: &MappedKeyEntry, b: &MappedKeyEntry) -> Ordering {
    a.key.cmp(&b.key)
}

/// A named command context: one mode's bindings, hotkeys, and mapped keys.
#[derive(Debug, Clone)]
pub struct KeyContext {
    pub name: Option<String>,
    pub title: Option<String>,
    pub bindings: SortedVec<KeyBinding>,
    pub hotkeys: SortedVec<HotkeyEntry>,
    pub mapped_keys: SortedVec<MappedKeyEntry>,
    /// Keyboard-function bits always OR'd into braille chords typed in
    /// this context.
    pub superimpose: u16,
    /// Built in (default or menu) rather than authored.
    pub is_special: bool,
    /// Selected by a `context` directive at least once.
    pub is_defined: bool,
    /// Targeted by at least one CONTEXT command.
    pub is_referenced: bool,
    /// Never falls back to the default context on an unbound chord.
    pub is_isolated: bool,
}

impl KeyContext {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            title: None,
            bindings: SortedVec::new(compare_bindings),
            hotkeys: SortedVec::new(compare_hotkeys),
            mapped_keys: SortedVec::new(compare_mapped_keys),
            superimpose: 0,
            is_special: false,
            is_defined: false,
            is_referenced: false,
            is_isolated: false,
        }
    }

    pub fn special(name: &str) -> Self {
        let mut ctx = Self::new(Some(name.to_string()));
        ctx.is_special = true;
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.hotkeys.is_empty() && self.mapped_keys.is_empty()
    }

    /// Display label for listings and diagnostics.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("(anonymous)")
    }

    /// Find a hotkey for a concrete key: exact value first, then the group
    /// wildcard.
    pub fn find_hotkey(&self, key: KeyValue) -> Option<&HotkeyEntry> {
        for probe in [key, key.to_any()] {
            if let Ok(index) = self.hotkeys.find_by(|entry| entry.key.cmp(&probe)) {
                return self.hotkeys.get(index);
            }
        }
        None
    }

    /// Find the keyboard function mapped to a concrete key, exact value
    /// first, then the group wildcard.
    pub fn find_mapped_key(&self, key: KeyValue) -> Option<KeyboardFunction> {
        for probe in [key, key.to_any()] {
            if let Ok(index) = self.mapped_keys.find_by(|entry| entry.key.cmp(&probe)) {
                return self.mapped_keys.get(index).map(|entry| entry.function);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::find_command;

    fn bound(name: &str) -> BoundCommand {
        BoundCommand::new(find_command(name).unwrap())
    }

    #[test]
    fn test_hotkey_wildcard_lookup() {
        let mut ctx = KeyContext::new(None);
        ctx.hotkeys.insert(HotkeyEntry {
            key: KeyValue::new(0, 3),
            press: Some(bound("HOME")),
            release: None,
            duplicate: false,
        });
        ctx.hotkeys.insert(HotkeyEntry {
            key: KeyValue::any(1),
            press: Some(bound("MUTE")),
            release: None,
            duplicate: false,
        });

        // Exact match preferred.
        let exact = ctx.find_hotkey(KeyValue::new(0, 3)).unwrap();
        assert_eq!(exact.press.unwrap().entry.name, "HOME");
        // Group wildcard catches any key of group 1.
        let wild = ctx.find_hotkey(KeyValue::new(1, 9)).unwrap();
        assert_eq!(wild.press.unwrap().entry.name, "MUTE");
        assert!(ctx.find_hotkey(KeyValue::new(2, 0)).is_none());
    }

    #[test]
    fn test_keyboard_function_bits() {
        assert_eq!(KeyboardFunction::Dot1.bit(), 1);
        assert_eq!(KeyboardFunction::Dot8.bit(), 0x80);
        assert_eq!(KeyboardFunction::Space.bit(), 0);
        assert_eq!(KeyboardFunction::Control.bit() & KeyboardFunction::DOT_MASK, 0);
    }

    #[test]
    fn test_keyboard_function_parse() {
        use std::str::FromStr;
        assert_eq!(
            KeyboardFunction::from_str("dot3").unwrap(),
            KeyboardFunction::Dot3
        );
        assert_eq!(
            KeyboardFunction::from_str("SPACE").unwrap(),
            KeyboardFunction::Space
        );
        assert!(KeyboardFunction::from_str("pedal").is_err());
    }

    #[test]
    fn test_context_label() {
        let mut ctx = KeyContext::new(Some("nav".to_string()));
        assert_eq!(ctx.label(), "nav");
        ctx.title = Some("Navigation Mode".to_string());
        assert_eq!(ctx.label(), "Navigation Mode");
        assert_eq!(KeyContext::new(None).label(), "(anonymous)");
    }
}
