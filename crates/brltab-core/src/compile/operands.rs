// Brltab Operand Parsing
// Key names, key combinations, and keyboard functions

use std::str::FromStr;

use thiserror::Error;

use crate::combo::{ComboError, KeyCombination};
use crate::context::KeyboardFunction;
use crate::key::{KeyValue, KEY_NUMBER_ANY};
use crate::names::KeyNameSet;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperandError {
    #[error("unknown key name {0}")]
    UnknownKey(String),

    #[error("invalid key number suffix in {0}")]
    BadKeyNumber(String),

    #[error("empty key combination")]
    EmptyCombination,

    #[error(transparent)]
    Combo(#[from] ComboError),

    #[error("unknown keyboard function {0}")]
    UnknownFunction(String),
}

/// Resolve one key operand against the name set.
///
/// A dotted suffix selects a concrete key within a named group: the name
/// before the dot must resolve, and the 1-based number after it replaces
/// the key number. `RoutingKey.8` is the eighth key of the routing group.
pub fn parse_key(names: &KeyNameSet, operand: &str) -> Result<KeyValue, OperandError> {
    if let Some(value) = names.lookup_name(operand) {
        return Ok(value);
    }
    if let Some((prefix, suffix)) = operand.rsplit_once('.') {
        if let Some(base) = names.lookup_name(prefix) {
            let number: u16 = suffix
                .parse()
                .map_err(|_| OperandError::BadKeyNumber(operand.to_string()))?;
            if number == 0 || number > KEY_NUMBER_ANY as u16 {
                return Err(OperandError::BadKeyNumber(operand.to_string()));
            }
            return Ok(base.with_number((number - 1) as u8));
        }
    }
    Err(OperandError::UnknownKey(operand.to_string()))
}

/// Parse a key combination operand: `mod+mod+key`, with an optional `!`
/// on the final key marking it immediate.
pub fn parse_combination(
    names: &KeyNameSet,
    operand: &str,
) -> Result<KeyCombination, OperandError> {
    let mut tokens: Vec<&str> = operand.split('+').collect();
    if tokens.iter().any(|token| token.is_empty()) {
        return Err(OperandError::UnknownKey(operand.to_string()));
    }
    let last = tokens.pop().ok_or(OperandError::EmptyCombination)?;

    let immediate = if let Some(name) = last.strip_prefix('!') {
        Some(parse_key(names, name)?)
    } else {
        tokens.push(last);
        None
    };

    let modifiers = tokens
        .iter()
        .map(|token| parse_key(names, token))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(KeyCombination::new(modifiers, immediate)?)
}

/// Parse a keyboard function name (case-insensitive, via strum).
pub fn parse_keyboard_function(operand: &str) -> Result<KeyboardFunction, OperandError> {
    KeyboardFunction::from_str(operand)
        .map_err(|_| OperandError::UnknownFunction(operand.to_string()))
}
