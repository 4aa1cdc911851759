// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user OTP state and its typed field-ID access API.
//!
//! Setters come in two moods: with a policy reference they validate the
//! mutation against the frozen [`PolicyConfig`] (unprivileged callers),
//! without one they only enforce hard type/range invariants (privileged
//! callers). The transport projects fields by [`FieldId`].

use serde::{Deserialize, Serialize};

use crate::alphabet;
use crate::config::{Allowance, PolicyConfig};
use crate::engine;
use crate::error::AgentError;

/// State flag bits. Wire values, fixed.
pub mod flags {
    pub const SALTED: u32 = 1;
    pub const SKIP: u32 = 2;
    pub const SHOW: u32 = 4;
    pub const DISABLED: u32 = 8;
    pub const ALPHABET_EXTENDED: u32 = 16;

    pub const ALL: u32 = SALTED | SKIP | SHOW | DISABLED | ALPHABET_EXTENDED;
}

/// Warning condition bits reported by `GetWarnings`.
pub mod warnings {
    pub const LAST_CARD: u32 = 1;
    pub const NOTHING_LEFT: u32 = 2;
    pub const RECENT_FAILURES: u32 = 4;
    pub const DISABLED: u32 = 8;
}

pub const LABEL_MAX: usize = 30;
pub const CONTACT_MAX: usize = 60;

/// Characters allowed in label/contact strings besides alphanumerics.
const STR_FIELD_EXTRA: &str = " -+.@_*";

/// Field identifiers used as `int_arg` of `Get*`/`Set*` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Key = 1,
    Counter = 2,
    Flags = 3,
    LatestCard = 4,
    CurrentCard = 5,
    MaxCard = 6,
    MaxCode = 7,
    UnsaltedCounter = 8,
    CodeLength = 9,
    Alphabet = 10,
    Label = 11,
    Contact = 12,
    RecentFailures = 13,
    SpassSet = 14,
}

impl FieldId {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Key,
            2 => Self::Counter,
            3 => Self::Flags,
            4 => Self::LatestCard,
            5 => Self::CurrentCard,
            6 => Self::MaxCard,
            7 => Self::MaxCode,
            8 => Self::UnsaltedCounter,
            9 => Self::CodeLength,
            10 => Self::Alphabet,
            11 => Self::Label,
            12 => Self::Contact,
            13 => Self::RecentFailures,
            14 => Self::SpassSet,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpassRecord {
    pub hash: [u8; 32],
    pub salt: [u8; 8],
}

/// Outcome of a successful `set_spass`; reported to the peer through the
/// informational `SpassSet`/`SpassUnset` status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpassOutcome {
    Set,
    Unset,
}

/// On-disk representation. The file is opaque to everything but this
/// module and the store.
#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    version: u32,
    username: String,
    sequence_key: [u8; 32],
    counter: u128,
    latest_card: u128,
    flags: u32,
    alphabet: u32,
    code_length: u32,
    label: String,
    contact: String,
    spass: Option<SpassRecord>,
    recent_failures: u32,
}

const RECORD_VERSION: u32 = 1;

/// In-memory per-user OTP state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PppState {
    username: String,
    sequence_key: [u8; 32],
    counter: u128,
    latest_card: u128,
    flags: u32,
    alphabet: u32,
    code_length: u32,
    label: String,
    contact: String,
    spass: Option<SpassRecord>,
    recent_failures: u32,
}

impl PppState {
    /// Fresh state for a user, shaped by policy defaults. Nothing is
    /// persisted until the owner explicitly stores it.
    pub fn new(username: &str, policy: &PolicyConfig) -> Self {
        let mut state_flags = 0;
        if policy.salt_def {
            state_flags |= flags::SALTED;
        }
        if policy.show_def {
            state_flags |= flags::SHOW;
        }
        Self {
            username: username.to_owned(),
            sequence_key: [0u8; 32],
            counter: 0,
            latest_card: 0,
            flags: state_flags,
            alphabet: policy.alphabet_def,
            code_length: policy.passcode_def_length,
            label: String::new(),
            contact: String::new(),
            spass: None,
            recent_failures: 0,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.sequence_key
    }

    pub fn is_salted(&self) -> bool {
        self.flags & flags::SALTED != 0
    }

    pub fn flag_check(&self, mask: u32) -> bool {
        self.flags & mask != 0
    }

    /// Passcode index with the salt base removed.
    pub fn unsalted_counter(&self) -> u128 {
        if self.is_salted() {
            self.counter & engine::SALT_MASK
        } else {
            self.counter
        }
    }

    fn salt_base(&self) -> u128 {
        if self.is_salted() {
            self.counter & !engine::SALT_MASK
        } else {
            0
        }
    }

    pub fn current_card(&self) -> u128 {
        self.unsalted_counter() / engine::codes_on_card(self.code_length) + 1
    }

    pub fn max_code(&self) -> u128 {
        engine::max_code(self.is_salted())
    }

    pub fn max_card(&self) -> u128 {
        engine::max_card(self.is_salted(), self.code_length)
    }

    /// Whether the counter space is exhausted.
    ///
    /// The final index is a sentinel: the counter never moves past it (a
    /// salted counter would otherwise overflow into its salt base), so
    /// standing on it means no usable passcodes remain.
    pub fn out_of_codes(&self) -> bool {
        self.unsalted_counter() + 1 >= self.max_code()
    }

    // --- field projection -------------------------------------------------

    pub fn get_num(&self, field: FieldId) -> Result<u128, AgentError> {
        Ok(match field {
            FieldId::Counter => self.counter,
            FieldId::LatestCard => self.latest_card,
            FieldId::CurrentCard => self.current_card(),
            FieldId::MaxCard => self.max_card(),
            FieldId::MaxCode => self.max_code(),
            FieldId::UnsaltedCounter => self.unsalted_counter(),
            _ => return Err(AgentError::BadArg),
        })
    }

    pub fn set_num(
        &mut self,
        field: FieldId,
        value: u128,
        policy: Option<&PolicyConfig>,
    ) -> Result<(), AgentError> {
        match field {
            FieldId::LatestCard => {
                if value < self.latest_card {
                    return Err(AgentError::Range);
                }
                self.latest_card = value;
                Ok(())
            }
            FieldId::Counter => {
                // Raw counter writes are a privileged import path.
                if policy.is_some() {
                    return Err(AgentError::PolicyDenied);
                }
                self.counter = value;
                Ok(())
            }
            _ => Err(AgentError::BadArg),
        }
    }

    pub fn get_int(&self, field: FieldId) -> Result<u32, AgentError> {
        Ok(match field {
            FieldId::Flags => self.flags,
            FieldId::CodeLength => self.code_length,
            FieldId::Alphabet => self.alphabet,
            FieldId::RecentFailures => self.recent_failures,
            FieldId::SpassSet => u32::from(self.spass.is_some()),
            _ => return Err(AgentError::BadArg),
        })
    }

    pub fn set_int(
        &mut self,
        field: FieldId,
        value: u32,
        policy: Option<&PolicyConfig>,
    ) -> Result<(), AgentError> {
        match field {
            FieldId::Flags => self.set_flags(value, policy),
            FieldId::CodeLength => {
                if !(engine::CODE_LENGTH_MIN..=engine::CODE_LENGTH_MAX).contains(&value) {
                    return Err(AgentError::Range);
                }
                if let Some(policy) = policy {
                    if value < policy.passcode_min_length || value > policy.passcode_max_length {
                        return Err(AgentError::PolicyDenied);
                    }
                }
                self.code_length = value;
                Ok(())
            }
            FieldId::Alphabet => {
                if !alphabet::ALPHABET_IDS.contains(&value) {
                    return Err(AgentError::Range);
                }
                if let Some(policy) = policy {
                    if !policy.alphabet_allow_change {
                        return Err(AgentError::PolicyDenied);
                    }
                    if !alphabet::allowed_by_policy(value, policy)? {
                        return Err(AgentError::PolicyDenied);
                    }
                }
                self.alphabet = value;
                Ok(())
            }
            _ => Err(AgentError::BadArg),
        }
    }

    fn set_flags(&mut self, value: u32, policy: Option<&PolicyConfig>) -> Result<(), AgentError> {
        if value & !flags::ALL != 0 {
            return Err(AgentError::BadArg);
        }
        let changed = self.flags ^ value;
        // The salt layout is baked into the counter at key generation;
        // after that no caller, privileged or not, may toggle it.
        if changed & flags::SALTED != 0 && self.sequence_key != [0u8; 32] {
            return Err(AgentError::PolicySalt);
        }
        if let Some(policy) = policy {
            // Salt is chosen while the key does not exist yet; policy
            // still constrains the direction of that choice.
            if changed & flags::SALTED != 0 {
                let turning_on = value & flags::SALTED != 0;
                if turning_on && policy.salt == Allowance::Disallow {
                    return Err(AgentError::PolicySalt);
                }
                if !turning_on && policy.salt == Allowance::Enforce {
                    return Err(AgentError::PolicySalt);
                }
            }
            if changed & flags::DISABLED != 0 && !policy.allow_disabling {
                return Err(AgentError::PolicyDisabled);
            }
            if changed & flags::SHOW != 0 {
                let turning_on = value & flags::SHOW != 0;
                if turning_on && policy.show == Allowance::Disallow {
                    return Err(AgentError::PolicyShow);
                }
                if !turning_on && policy.show == Allowance::Enforce {
                    return Err(AgentError::PolicyShow);
                }
            }
        }
        self.flags = value;
        Ok(())
    }

    pub fn get_str(&self, field: FieldId) -> Result<String, AgentError> {
        Ok(match field {
            FieldId::Label => self.label.clone(),
            FieldId::Contact => self.contact.clone(),
            FieldId::Counter => self.counter.to_string(),
            _ => return Err(AgentError::BadArg),
        })
    }

    pub fn set_str(
        &mut self,
        field: FieldId,
        value: &str,
        policy: Option<&PolicyConfig>,
    ) -> Result<(), AgentError> {
        let (slot, max, allowed) = match field {
            FieldId::Label => (
                &mut self.label,
                LABEL_MAX,
                policy.map_or(true, |p| p.allow_label_change),
            ),
            FieldId::Contact => (
                &mut self.contact,
                CONTACT_MAX,
                policy.map_or(true, |p| p.allow_contact_change),
            ),
            _ => return Err(AgentError::BadArg),
        };
        if !allowed {
            return Err(AgentError::PolicyDenied);
        }
        if value.len() > max {
            return Err(AgentError::TooLong);
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || STR_FIELD_EXTRA.contains(c))
        {
            return Err(AgentError::IllegalChar);
        }
        *slot = value.to_owned();
        Ok(())
    }

    // --- key and counter operations ---------------------------------------

    /// Generate a fresh sequence key. Resets the counter (to a new salt
    /// base when salted), the printed-card marker and the failure count.
    pub fn generate_key(&mut self) {
        self.sequence_key = engine::random_key();
        self.counter = if self.is_salted() {
            engine::new_salt_base()
        } else {
            0
        };
        self.latest_card = 0;
        self.recent_failures = 0;
    }

    /// Burn one passcode.
    pub fn increment(&mut self) -> Result<(), AgentError> {
        if self.out_of_codes() {
            return Err(AgentError::NumSpace);
        }
        self.counter += 1;
        Ok(())
    }

    /// Jump to an absolute (unsalted) passcode index.
    pub fn skip_to(
        &mut self,
        target: u128,
        policy: Option<&PolicyConfig>,
    ) -> Result<(), AgentError> {
        if target >= self.max_code() {
            return Err(AgentError::Range);
        }
        if target < self.unsalted_counter() {
            if let Some(policy) = policy {
                if !policy.allow_backward_skipping {
                    return Err(AgentError::PolicyDenied);
                }
            }
        }
        self.counter = self.salt_base() + target;
        Ok(())
    }

    /// Passcode at an absolute counter value (salt included).
    pub fn passcode_at(&self, counter: u128, policy: &PolicyConfig) -> Result<String, AgentError> {
        let chars = alphabet::get(self.alphabet, policy)?;
        engine::passcode(&self.sequence_key, counter, chars, self.code_length)
    }

    pub fn prompt_at(&self, counter: u128) -> String {
        let unsalted = if self.is_salted() {
            counter & engine::SALT_MASK
        } else {
            counter
        };
        engine::prompt(unsalted, self.code_length)
    }

    /// Constant-time verification of a candidate passcode against the
    /// passcode at `counter`.
    pub fn verify_passcode(
        &self,
        counter: u128,
        candidate: &str,
        policy: &PolicyConfig,
    ) -> Result<(), AgentError> {
        let expected = self.passcode_at(counter, policy)?;
        ring::constant_time::verify_slices_are_equal(expected.as_bytes(), candidate.as_bytes())
            .map_err(|_| AgentError::AuthFailed)
    }

    pub fn register_failure(&mut self) {
        self.recent_failures = self.recent_failures.saturating_add(1);
    }

    pub fn clear_failures(&mut self) {
        self.recent_failures = 0;
    }

    // --- static password --------------------------------------------------

    /// Set (`Some`) or remove (`None`) the static password.
    pub fn set_spass(
        &mut self,
        spass: Option<&str>,
        policy: Option<&PolicyConfig>,
    ) -> Result<SpassOutcome, AgentError> {
        if let Some(policy) = policy {
            if !policy.spass_allow_change {
                return Err(AgentError::PolicyDenied);
            }
        }
        let Some(spass) = spass else {
            self.spass = None;
            return Ok(SpassOutcome::Unset);
        };
        if let Some(policy) = policy {
            check_spass_composition(spass, policy)?;
        }
        let salt = engine::random_spass_salt();
        self.spass = Some(SpassRecord {
            hash: engine::spass_hash(&salt, spass),
            salt,
        });
        Ok(SpassOutcome::Set)
    }

    pub fn verify_spass(&self, candidate: &str) -> Result<(), AgentError> {
        let Some(record) = &self.spass else {
            return Err(AgentError::SpassUnset);
        };
        let hash = engine::spass_hash(&record.salt, candidate);
        ring::constant_time::verify_slices_are_equal(&record.hash, &hash)
            .map_err(|_| AgentError::AuthFailed)
    }

    // --- warnings ---------------------------------------------------------

    pub fn warning_conditions(&self, policy: &PolicyConfig) -> u32 {
        let mut out = 0;
        if self.out_of_codes() {
            out |= warnings::NOTHING_LEFT;
        } else if self.current_card() >= self.max_card() {
            out |= warnings::LAST_CARD;
        }
        if policy.failure_warning && self.recent_failures >= policy.failure_boundary {
            out |= warnings::RECENT_FAILURES;
        }
        if self.flag_check(flags::DISABLED) {
            out |= warnings::DISABLED;
        }
        out
    }

    // --- serialization ----------------------------------------------------

    pub fn to_bytes(&self) -> Result<Vec<u8>, AgentError> {
        let record = StateRecord {
            version: RECORD_VERSION,
            username: self.username.clone(),
            sequence_key: self.sequence_key,
            counter: self.counter,
            latest_card: self.latest_card,
            flags: self.flags,
            alphabet: self.alphabet,
            code_length: self.code_length,
            label: self.label.clone(),
            contact: self.contact.clone(),
            spass: self.spass.clone(),
            recent_failures: self.recent_failures,
        };
        serde_json::to_vec(&record).map_err(|_| AgentError::Internal)
    }

    pub fn from_bytes(bytes: &[u8], username: &str) -> Result<Self, AgentError> {
        let record: StateRecord =
            serde_json::from_slice(bytes).map_err(|_| AgentError::CorruptState)?;
        if record.version != RECORD_VERSION {
            return Err(AgentError::CorruptState);
        }
        if record.username != username {
            return Err(AgentError::CorruptState);
        }
        Ok(Self {
            username: record.username,
            sequence_key: record.sequence_key,
            counter: record.counter,
            latest_card: record.latest_card,
            flags: record.flags,
            alphabet: record.alphabet,
            code_length: record.code_length,
            label: record.label,
            contact: record.contact,
            spass: record.spass,
            recent_failures: record.recent_failures,
        })
    }
}

fn check_spass_composition(spass: &str, policy: &PolicyConfig) -> Result<(), AgentError> {
    if (spass.len() as u32) < policy.spass_min_length {
        return Err(AgentError::Range);
    }
    let digits = spass.chars().filter(char::is_ascii_digit).count() as u32;
    let uppercase = spass.chars().filter(char::is_ascii_uppercase).count() as u32;
    let special = spass
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric())
        .count() as u32;
    if digits < policy.spass_require_digit
        || uppercase < policy.spass_require_uppercase
        || special < policy.spass_require_special
    {
        return Err(AgentError::IllegalChar);
    }
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
