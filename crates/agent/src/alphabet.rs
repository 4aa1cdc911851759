// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in passcode alphabets plus the policy-supplied custom one.

use crate::config::PolicyConfig;
use crate::error::AgentError;

/// ID of the custom alphabet taken from policy.
pub const ALPHABET_CUSTOM: u32 = 0;

/// The classic 64-character set: unambiguous printable ASCII.
const ALPHABET_STD: &str =
    "!#%+23456789:=?@ABCDEFGHJKLMNPRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Extended 88-character set; passcodes become shorter-lived to shoulder
/// surfers but harder to transcribe.
const ALPHABET_EXTENDED: &str = "!\"#$%&'()*+,-./23456789:;<=>?@ABCDEFGHJKLMNOPRSTUVWXYZ[\\]^_abcdefghijkmnopqrstuvwxyz{|}~";

const ALPHABET_ALNUM: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const ALPHABET_DIGITS: &str = "0123456789";

const ALPHABET_HEX: &str = "0123456789ABCDEF";

pub const ALPHABET_IDS: &[u32] = &[0, 1, 2, 3, 4, 5];

/// Look up an alphabet by wire ID. `Range` for unknown IDs.
pub fn get(id: u32, policy: &PolicyConfig) -> Result<&str, AgentError> {
    match id {
        ALPHABET_CUSTOM => Ok(&policy.alphabet_custom),
        1 => Ok(ALPHABET_STD),
        2 => Ok(ALPHABET_EXTENDED),
        3 => Ok(ALPHABET_ALNUM),
        4 => Ok(ALPHABET_DIGITS),
        5 => Ok(ALPHABET_HEX),
        _ => Err(AgentError::Range),
    }
}

/// Whether an alphabet satisfies the policy length window. Used when an
/// unprivileged caller selects an alphabet for their state.
pub fn allowed_by_policy(id: u32, policy: &PolicyConfig) -> Result<bool, AgentError> {
    let chars = get(id, policy)?.chars().count() as u32;
    Ok(chars >= policy.alphabet_min_length && chars <= policy.alphabet_max_length)
}

/// Validate a custom alphabet string from the config file: printable ASCII,
/// no whitespace, no duplicates.
pub fn validate_custom(alphabet: &str) -> Result<(), AgentError> {
    let mut seen = [false; 128];
    for ch in alphabet.chars() {
        if !ch.is_ascii() || ch.is_ascii_whitespace() || ch.is_ascii_control() {
            return Err(AgentError::IllegalChar);
        }
        let idx = ch as usize;
        if seen[idx] {
            return Err(AgentError::IllegalChar);
        }
        seen[idx] = true;
    }
    Ok(())
}

#[cfg(test)]
#[path = "alphabet_tests.rs"]
mod tests;
