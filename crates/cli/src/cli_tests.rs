// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::{Cli, Command};

fn parse(args: &[&str]) -> anyhow::Result<Cli> {
    Ok(Cli::try_parse_from(args)?)
}

#[test]
fn key_with_options() -> anyhow::Result<()> {
    let cli = parse(&[
        "otpcard", "key", "--no-salt", "--codelength", "6", "--label", "desk",
    ])?;
    let Command::Key(args) = cli.command else {
        anyhow::bail!("unexpected command");
    };
    assert!(args.no_salt);
    assert_eq!(args.codelength, Some(6));
    assert_eq!(args.label.as_deref(), Some("desk"));
    assert_eq!(args.alphabet, None);
    Ok(())
}

#[test]
fn global_user_flag() -> anyhow::Result<()> {
    let cli = parse(&["otpcard", "--user", "bob", "info"])?;
    assert_eq!(cli.user.as_deref(), Some("bob"));
    assert!(matches!(cli.command, Command::Info));
    Ok(())
}

#[test]
fn skip_takes_a_number() -> anyhow::Result<()> {
    let cli = parse(&["otpcard", "skip", "421"])?;
    let Command::Skip(args) = cli.command else {
        anyhow::bail!("unexpected command");
    };
    assert_eq!(args.to, 421);
    Ok(())
}

#[test]
fn spass_unset_conflicts_with_password() {
    assert!(Cli::try_parse_from(["otpcard", "spass", "secret", "--unset"]).is_err());
}

#[test]
fn agent_path_prefers_explicit_flag() -> anyhow::Result<()> {
    let cli = parse(&["otpcard", "--agent", "/opt/otpcard-agent", "info"])?;
    assert_eq!(cli.agent_path()?, std::path::PathBuf::from("/opt/otpcard-agent"));
    Ok(())
}

#[test]
fn agent_path_defaults_to_sibling() -> anyhow::Result<()> {
    let cli = parse(&["otpcard", "info"])?;
    let path = cli.agent_path()?;
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("otpcard-agent"));
    Ok(())
}
