// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy configuration: a frozen value loaded once at agent start.
//!
//! Format is `key = value` with `#` comments, one setting per line. Every
//! recognized key is range-checked at parse time; unknown keys are errors so
//! a typo cannot silently weaken policy.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::alphabet;
use crate::error::AgentError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/otpcard/otpcard.conf";

/// Overrides the config file location; meant for tests and development
/// setups, the production path is the compiled-in default.
pub const CONFIG_PATH_ENV: &str = "OTPCARD_CONFIG";

/// Ternary policy switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Disallow,
    Allow,
    Enforce,
}

impl Allowance {
    fn parse(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Disallow),
            1 => Some(Self::Allow),
            2 => Some(Self::Enforce),
            _ => None,
        }
    }
}

/// Where per-user state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// One file per user under a root-owned state directory.
    Global,
    /// A dot-file in the user's home directory.
    User,
    /// Remote backends are recognized for config compatibility but not
    /// served by this agent.
    Mysql,
    Ldap,
}

impl DbKind {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Mysql | Self::Ldap)
    }
}

/// Frozen policy value; see `PolicyGate` and the state setters for the
/// enforcement points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub db: DbKind,
    pub state_dir: PathBuf,
    pub user_db_file: String,

    pub allow_key_generation: bool,
    pub allow_key_regeneration: bool,
    pub allow_disabling: bool,
    pub allow_key_removal: bool,
    pub allow_passcode_print: bool,
    pub allow_key_print: bool,
    pub allow_skipping: bool,
    pub allow_backward_skipping: bool,
    pub allow_shell_auth: bool,
    pub allow_state_import: bool,
    pub allow_state_export: bool,
    pub allow_contact_change: bool,
    pub allow_label_change: bool,

    pub salt: Allowance,
    pub salt_def: bool,
    pub show: Allowance,
    pub show_def: bool,

    pub passcode_def_length: u32,
    pub passcode_min_length: u32,
    pub passcode_max_length: u32,

    pub alphabet_allow_change: bool,
    pub alphabet_def: u32,
    pub alphabet_min_length: u32,
    pub alphabet_max_length: u32,
    pub alphabet_custom: String,

    pub spass_allow_change: bool,
    pub spass_min_length: u32,
    pub spass_require_digit: u32,
    pub spass_require_special: u32,
    pub spass_require_uppercase: u32,

    pub failure_warning: bool,
    pub failure_boundary: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            db: DbKind::Global,
            state_dir: PathBuf::from("/etc/otpcard/state"),
            user_db_file: ".otpcard".to_owned(),

            allow_key_generation: true,
            allow_key_regeneration: true,
            allow_disabling: false,
            allow_key_removal: true,
            allow_passcode_print: true,
            allow_key_print: true,
            allow_skipping: true,
            allow_backward_skipping: false,
            allow_shell_auth: true,
            allow_state_import: false,
            allow_state_export: true,
            allow_contact_change: true,
            allow_label_change: true,

            salt: Allowance::Allow,
            salt_def: true,
            show: Allowance::Allow,
            show_def: true,

            passcode_def_length: 4,
            passcode_min_length: 2,
            passcode_max_length: 16,

            alphabet_allow_change: true,
            alphabet_def: 1,
            alphabet_min_length: 32,
            alphabet_max_length: 88,
            alphabet_custom: "0123456789".to_owned(),

            spass_allow_change: true,
            spass_min_length: 7,
            spass_require_digit: 1,
            spass_require_special: 1,
            spass_require_uppercase: 1,

            failure_warning: true,
            failure_boundary: 3,
        }
    }
}

/// Resolve the config file location, honoring the env override.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and validate the policy config from `path`.
pub fn load(path: &Path) -> anyhow::Result<PolicyConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse(&contents).with_context(|| format!("parsing config file {}", path.display()))
}

fn parse_u32(value: &str, key: &str, min: u32, max: u32) -> anyhow::Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("{key}: expected an integer, got {value:?}"))?;
    if parsed < min || parsed > max {
        bail!("{key}: value {parsed} out of range ({min}..={max})");
    }
    Ok(parsed)
}

fn parse_bool(value: &str, key: &str) -> anyhow::Result<bool> {
    Ok(parse_u32(value, key, 0, 1)? == 1)
}

fn parse_allowance(value: &str, key: &str) -> anyhow::Result<Allowance> {
    let raw = parse_u32(value, key, 0, 2)?;
    Allowance::parse(raw).with_context(|| format!("{key}: invalid switch {raw}"))
}

fn parse(contents: &str) -> anyhow::Result<PolicyConfig> {
    let mut cfg = PolicyConfig::default();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("syntax error on line {line_no}: missing '='"))?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "db" => {
                cfg.db = match value.to_ascii_lowercase().as_str() {
                    "global" => DbKind::Global,
                    "user" => DbKind::User,
                    "mysql" => DbKind::Mysql,
                    "ldap" => DbKind::Ldap,
                    other => bail!("line {line_no}: unknown db backend {other:?}"),
                };
            }
            "state_dir" => {
                if value.is_empty() {
                    bail!("line {line_no}: state_dir must not be empty");
                }
                cfg.state_dir = PathBuf::from(value);
            }
            "db_user" => {
                if value.contains('/') || value.is_empty() {
                    bail!("line {line_no}: db_user must be a bare file name");
                }
                cfg.user_db_file = value.to_owned();
            }

            "allow_key_generation" => cfg.allow_key_generation = parse_bool(value, &key)?,
            "allow_key_regeneration" => cfg.allow_key_regeneration = parse_bool(value, &key)?,
            "allow_disabling" => cfg.allow_disabling = parse_bool(value, &key)?,
            "allow_key_removal" => cfg.allow_key_removal = parse_bool(value, &key)?,
            "allow_passcode_print" => cfg.allow_passcode_print = parse_bool(value, &key)?,
            "allow_key_print" => cfg.allow_key_print = parse_bool(value, &key)?,
            "allow_skipping" => cfg.allow_skipping = parse_bool(value, &key)?,
            "allow_backward_skipping" => cfg.allow_backward_skipping = parse_bool(value, &key)?,
            "allow_shell_auth" => cfg.allow_shell_auth = parse_bool(value, &key)?,
            "allow_state_import" => cfg.allow_state_import = parse_bool(value, &key)?,
            "allow_state_export" => cfg.allow_state_export = parse_bool(value, &key)?,
            "allow_contact_change" => cfg.allow_contact_change = parse_bool(value, &key)?,
            "allow_label_change" => cfg.allow_label_change = parse_bool(value, &key)?,

            "salt_allow" => cfg.salt = parse_allowance(value, &key)?,
            "salt_def" => cfg.salt_def = parse_bool(value, &key)?,
            "show_allow" => cfg.show = parse_allowance(value, &key)?,
            "show_def" => cfg.show_def = parse_bool(value, &key)?,

            "passcode_def_length" => cfg.passcode_def_length = parse_u32(value, &key, 2, 16)?,
            "passcode_min_length" => cfg.passcode_min_length = parse_u32(value, &key, 2, 16)?,
            "passcode_max_length" => cfg.passcode_max_length = parse_u32(value, &key, 2, 16)?,

            "alphabet_allow_change" => cfg.alphabet_allow_change = parse_bool(value, &key)?,
            "alphabet_def" => cfg.alphabet_def = parse_u32(value, &key, 0, 5)?,
            "alphabet_min_length" => cfg.alphabet_min_length = parse_u32(value, &key, 5, 88)?,
            "alphabet_max_length" => cfg.alphabet_max_length = parse_u32(value, &key, 5, 88)?,
            "alphabet_custom" => {
                if alphabet::validate_custom(value).is_err() {
                    bail!("line {line_no}: custom alphabet must be printable ASCII without duplicates");
                }
                cfg.alphabet_custom = value.to_owned();
            }

            "spass_allow_change" => cfg.spass_allow_change = parse_bool(value, &key)?,
            "spass_min_length" => cfg.spass_min_length = parse_u32(value, &key, 4, 500)?,
            "spass_require_digit" => cfg.spass_require_digit = parse_u32(value, &key, 0, 20)?,
            "spass_require_special" => cfg.spass_require_special = parse_u32(value, &key, 0, 20)?,
            "spass_require_uppercase" => {
                cfg.spass_require_uppercase = parse_u32(value, &key, 0, 20)?;
            }

            "failure_warning" => cfg.failure_warning = parse_bool(value, &key)?,
            "failure_boundary" => cfg.failure_boundary = parse_u32(value, &key, 0, 500)?,

            other => bail!("line {line_no}: unrecognized config key {other:?}"),
        }
    }

    validate(&cfg)?;
    Ok(cfg)
}

/// Cross-field consistency checks; a default inconsistent with its own
/// allowance switch is a config bug, not something to silently repair.
fn validate(cfg: &PolicyConfig) -> anyhow::Result<()> {
    if cfg.show == Allowance::Disallow && cfg.show_def {
        bail!("show_def inconsistent with show_allow policy");
    }
    if cfg.show == Allowance::Enforce && !cfg.show_def {
        bail!("show_def inconsistent with show_allow policy");
    }
    if cfg.salt == Allowance::Disallow && cfg.salt_def {
        bail!("salt_def inconsistent with salt_allow policy");
    }
    if cfg.salt == Allowance::Enforce && !cfg.salt_def {
        bail!("salt_def inconsistent with salt_allow policy");
    }
    if cfg.passcode_min_length > cfg.passcode_max_length {
        bail!("passcode_min_length greater than passcode_max_length");
    }
    if cfg.passcode_def_length < cfg.passcode_min_length
        || cfg.passcode_def_length > cfg.passcode_max_length
    {
        bail!("passcode_def_length outside the min/max window");
    }
    if cfg.alphabet_min_length > cfg.alphabet_max_length {
        bail!("alphabet_min_length greater than alphabet_max_length");
    }
    Ok(())
}

/// Startup permissions preflight (reported through the Init frame).
///
/// The root-ownership requirement guards a privileged agent against being
/// pointed at a doctored config; it binds only when the agent actually runs
/// with privilege. The world-access check for remote backends protects
/// embedded credentials and applies regardless.
pub fn preflight(path: &Path, cfg: &PolicyConfig, privileged: bool) -> Result<(), AgentError> {
    let meta = std::fs::metadata(path).map_err(|_| AgentError::IoError)?;

    if privileged && (meta.uid() != 0 || meta.gid() != 0) {
        return Err(AgentError::ConfigOwnership);
    }

    if cfg.db.is_remote() && meta.mode() & 0o007 != 0 {
        return Err(AgentError::ConfigPermissions);
    }

    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
