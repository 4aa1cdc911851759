// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

/// One-time password manager (PPPv3 passcards).
#[derive(Debug, Parser)]
#[command(name = "otpcard", version, about)]
pub struct Cli {
    /// Operate on another user's state (administrators only).
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Path to the privileged agent binary.
    #[arg(long, env = "OTPCARD_AGENT", global = true)]
    pub agent: Option<PathBuf>,

    /// Agent config file override (passed through to the agent).
    #[arg(long, env = "OTPCARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to confirmation prompts.
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a new key (and state), replacing any existing one.
    Key(KeyArgs),
    /// Remove the state and key entirely.
    Remove,
    /// Show state, flags and passcard position.
    Info,
    /// Print one passcode.
    Passcode(PasscodeArgs),
    /// Print the authentication prompt for the current passcode.
    Prompt,
    /// Skip forward to a passcode number.
    Skip(SkipArgs),
    /// Authenticate with a passcode (burns it).
    Auth(AuthArgs),
    /// Set or clear a user-selectable flag.
    Flag(FlagArgs),
    /// Change the passcard label.
    Label(LabelArgs),
    /// Change the contact line printed on passcards.
    Contact(ContactArgs),
    /// Set or unset the static password.
    Spass(SpassArgs),
    /// List available alphabets.
    Alphabets,
    /// Show warning conditions for the state.
    Warnings,
}

#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Generate an unsalted key (counter is not masked).
    #[arg(long)]
    pub no_salt: bool,

    /// Passcode length (2..=16).
    #[arg(long)]
    pub codelength: Option<u32>,

    /// Alphabet ID; see `otpcard alphabets`.
    #[arg(long)]
    pub alphabet: Option<u32>,

    /// Passcard label.
    #[arg(long)]
    pub label: Option<String>,

    /// Contact line.
    #[arg(long)]
    pub contact: Option<String>,
}

#[derive(Debug, Args)]
pub struct PasscodeArgs {
    /// "current" or an absolute passcode number (starting at 1).
    pub which: String,
}

#[derive(Debug, Args)]
pub struct SkipArgs {
    /// Absolute passcode number to skip to (starting at 1).
    pub to: u128,
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    /// The passcode to verify.
    pub passcode: String,
}

#[derive(Debug, Args)]
pub struct FlagArgs {
    /// One of: show, dont-show, skip, dont-skip, disable, enable.
    pub flag: String,
}

#[derive(Debug, Args)]
pub struct LabelArgs {
    pub label: String,
}

#[derive(Debug, Args)]
pub struct ContactArgs {
    pub contact: String,
}

#[derive(Debug, Args)]
pub struct SpassArgs {
    /// The new static password; omit together with --unset to remove it.
    pub password: Option<String>,

    /// Remove the static password.
    #[arg(long, conflicts_with = "password")]
    pub unset: bool,
}

impl Cli {
    /// Locate the agent binary: explicit flag/env first, then a sibling of
    /// this executable.
    pub fn agent_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.agent {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe().context("resolving current executable")?;
        let dir = exe
            .parent()
            .context("executable has no parent directory")?;
        Ok(dir.join("otpcard-agent"))
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
