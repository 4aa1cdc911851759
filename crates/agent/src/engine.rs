// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Passcode arithmetic: (key, counter) -> printable passcode, passcard
//! geometry, and the salted counter layout.
//!
//! A salted counter keeps the real passcode index in the low 32 bits and a
//! random base in the upper bits, so counter values leaked from one state
//! say nothing about another.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AgentError;

pub const KEY_BYTES: usize = 32;

/// Low bits of a salted counter that hold the passcode index.
pub const SALT_MASK: u128 = 0xFFFF_FFFF;

pub const CARD_ROWS: u32 = 10;

/// Printable width budget of one passcard row.
const CARD_WIDTH: u32 = 64;

pub const CODE_LENGTH_MIN: u32 = 2;
pub const CODE_LENGTH_MAX: u32 = 16;

/// Columns on a passcard for the given passcode length.
pub fn columns_on_card(code_length: u32) -> u32 {
    (CARD_WIDTH / (code_length + 1)).clamp(1, 10)
}

pub fn codes_on_card(code_length: u32) -> u128 {
    u128::from(CARD_ROWS * columns_on_card(code_length))
}

/// Total passcodes in the counter space.
pub fn max_code(salted: bool) -> u128 {
    if salted {
        1 << 32
    } else {
        1 << 64
    }
}

pub fn max_card(salted: bool, code_length: u32) -> u128 {
    max_code(salted) / codes_on_card(code_length)
}

/// Random upper-bit base for a fresh salted counter.
pub fn new_salt_base() -> u128 {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    u128::from_ne_bytes(bytes) & !SALT_MASK
}

pub fn random_key() -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Compute the passcode for an absolute counter value.
///
/// Each output character consumes two digest bytes; with the 16-character
/// length cap the 32-byte digest is exactly enough.
pub fn passcode(
    key: &[u8; KEY_BYTES],
    counter: u128,
    alphabet: &str,
    code_length: u32,
) -> Result<String, AgentError> {
    if !(CODE_LENGTH_MIN..=CODE_LENGTH_MAX).contains(&code_length) {
        return Err(AgentError::Range);
    }
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return Err(AgentError::Range);
    }

    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();

    let mut code = String::with_capacity(code_length as usize);
    for i in 0..code_length as usize {
        let word = u16::from_be_bytes([digest[2 * i], digest[2 * i + 1]]);
        code.push(chars[word as usize % chars.len()]);
    }
    Ok(code)
}

/// Passcard coordinates of an unsalted passcode index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub card: u128,
    pub row: u32,
    pub column: char,
}

pub fn locate(unsalted: u128, code_length: u32) -> Location {
    let per_card = codes_on_card(code_length);
    let columns = columns_on_card(code_length);
    let within = unsalted % per_card;
    Location {
        card: unsalted / per_card + 1,
        row: (within / u128::from(columns)) as u32 + 1,
        // Columns run A..J.
        column: (b'A' + (within % u128::from(columns)) as u8) as char,
    }
}

/// Login prompt naming the passcode the user should type next.
pub fn prompt(unsalted: u128, code_length: u32) -> String {
    let at = locate(unsalted, code_length);
    format!("Passcode {}{} [{}]: ", at.column, at.row, at.card)
}

/// Hash a static password with its per-state salt.
pub fn spass_hash(salt: &[u8; 8], spass: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(spass.as_bytes());
    hasher.finalize().into()
}

pub fn random_spass_salt() -> [u8; 8] {
    let mut salt = [0u8; 8];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
