// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The administrative actions, one per CLI command. Each sequences agent
//! requests; all policy decisions stay on the agent side.

use std::io::Write;

use anyhow::{bail, Context};
use tokio::io::{AsyncRead, AsyncWrite};

use otpcard_agent::client::AgentClient;
use otpcard_agent::error::AgentError;
use otpcard_agent::state::{flags, warnings, FieldId, SpassOutcome};

use crate::cli::{
    AuthArgs, ContactArgs, FlagArgs, KeyArgs, LabelArgs, PasscodeArgs, SkipArgs, SpassArgs,
};

type Client<'a, R, W> = &'a mut AgentClient<R, W>;

fn friendly(err: AgentError) -> anyhow::Error {
    anyhow::anyhow!(err.message())
}

/// Ask before destructive operations unless `--yes` was given.
fn confirm(question: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{question} (yes/no): ");
    std::io::stdout().flush().ok();
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

pub async fn key_generate<R, W>(
    client: Client<'_, R, W>,
    args: &KeyArgs,
    yes: bool,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Look for existing state first so the user can back out.
    match client.state_load().await {
        Ok(()) => {
            client.state_drop().await.map_err(friendly)?;
            if !confirm("A key already exists. Overwrite it?", yes)? {
                bail!("aborted");
            }
        }
        Err(AgentError::NoState) => {}
        Err(err) => return Err(friendly(err)),
    }

    client.state_new().await.map_err(friendly)?;
    if args.no_salt {
        client.flag_clear(flags::SALTED).await.map_err(friendly)?;
    }
    if let Some(length) = args.codelength {
        client
            .set_int(FieldId::CodeLength, length)
            .await
            .map_err(friendly)?;
    }
    if let Some(alphabet) = args.alphabet {
        client
            .set_int(FieldId::Alphabet, alphabet)
            .await
            .map_err(friendly)?;
    }
    if let Some(label) = &args.label {
        client
            .set_str(FieldId::Label, label)
            .await
            .map_err(friendly)?;
    }
    if let Some(contact) = &args.contact {
        client
            .set_str(FieldId::Contact, contact)
            .await
            .map_err(friendly)?;
    }

    client.key_generate().await.map_err(friendly)?;
    let first_prompt = client.get_prompt(0).await.map_err(friendly)?;
    client.state_store().await.map_err(friendly)?;

    println!("Key generated.");
    println!("First login will ask for: {first_prompt}");
    Ok(())
}

pub async fn key_remove<R, W>(client: Client<'_, R, W>, yes: bool) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !confirm("Remove your key and all OTP state?", yes)? {
        bail!("aborted");
    }
    client.key_remove().await.map_err(friendly)?;
    println!("State removed.");
    Ok(())
}

pub async fn info<R, W>(client: Client<'_, R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client.state_load().await.map_err(friendly)?;

    let state_flags = client.flag_get().await.map_err(friendly)?;
    let current_card = client.get_num(FieldId::CurrentCard).await.map_err(friendly)?;
    let current_code = client
        .get_num(FieldId::UnsaltedCounter)
        .await
        .map_err(friendly)?;
    let latest_card = client.get_num(FieldId::LatestCard).await.map_err(friendly)?;
    let max_card = client.get_num(FieldId::MaxCard).await.map_err(friendly)?;
    let code_length = client.get_int(FieldId::CodeLength).await.map_err(friendly)?;
    let alphabet = client.get_int(FieldId::Alphabet).await.map_err(friendly)?;
    let label = client.get_str(FieldId::Label).await.map_err(friendly)?;
    let contact = client.get_str(FieldId::Contact).await.map_err(friendly)?;
    let spass_set = client.get_int(FieldId::SpassSet).await.map_err(friendly)?;

    println!("Current card        = {current_card}");
    println!("Current code        = {current_code}");
    println!("Latest printed card = {latest_card}");
    println!("Max card            = {max_card}");
    println!(
        "Flags: show={} skip={} disabled={} salt={}",
        on_off(state_flags & flags::SHOW != 0),
        on_off(state_flags & flags::SKIP != 0),
        on_off(state_flags & flags::DISABLED != 0),
        on_off(state_flags & flags::SALTED != 0),
    );
    println!("Alphabet ID = {alphabet}, code length = {code_length}");
    if label.is_empty() {
        println!("No label.");
    } else {
        println!("Passcard label = {label:?}");
    }
    if contact.is_empty() {
        println!("No contact information.");
    } else {
        println!("Contact = {contact:?}");
    }
    if spass_set != 0 {
        println!("Static password is set.");
    } else {
        println!("Static password is not set.");
    }

    client.state_drop().await.map_err(friendly)?;
    Ok(())
}

pub async fn passcode<R, W>(client: Client<'_, R, W>, args: &PasscodeArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client.state_load().await.map_err(friendly)?;

    let counter = client.get_num(FieldId::Counter).await.map_err(friendly)?;
    let target = if args.which.eq_ignore_ascii_case("current") {
        counter
    } else {
        let number: u128 = args
            .which
            .parse()
            .context("passcode must be \"current\" or a number starting at 1")?;
        if number == 0 {
            bail!("passcode numbering starts at 1");
        }
        let unsalted = client
            .get_num(FieldId::UnsaltedCounter)
            .await
            .map_err(friendly)?;
        // Re-apply the salt base the agent keeps in the counter.
        counter - unsalted + (number - 1)
    };

    let code = client.get_passcode(target).await.map_err(friendly)?;
    println!("{code}");
    client.state_drop().await.map_err(friendly)?;
    Ok(())
}

pub async fn prompt<R, W>(client: Client<'_, R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client.state_load().await.map_err(friendly)?;
    let counter = client.get_num(FieldId::Counter).await.map_err(friendly)?;
    let text = client.get_prompt(counter).await.map_err(friendly)?;
    println!("{text}");
    client.state_drop().await.map_err(friendly)?;
    Ok(())
}

pub async fn skip<R, W>(client: Client<'_, R, W>, args: &SkipArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if args.to == 0 {
        bail!("passcode numbering starts at 1");
    }
    client.state_load().await.map_err(friendly)?;
    client.skip(args.to - 1).await.map_err(friendly)?;
    println!("Skipped to passcode {}.", args.to);
    client.state_drop().await.map_err(friendly)?;
    Ok(())
}

pub async fn auth<R, W>(client: Client<'_, R, W>, args: &AuthArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client.state_load().await.map_err(friendly)?;
    match client.authenticate(&args.passcode).await {
        Ok(()) => {
            println!("Authentication succeeded.");
            Ok(())
        }
        Err(AgentError::AuthFailed) => bail!("authentication failed"),
        Err(err) => Err(friendly(err)),
    }
}

pub async fn flag<R, W>(client: Client<'_, R, W>, args: &FlagArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mask, add) = match args.flag.as_str() {
        "show" => (flags::SHOW, true),
        "dont-show" => (flags::SHOW, false),
        "skip" => (flags::SKIP, true),
        "dont-skip" => (flags::SKIP, false),
        "disable" => (flags::DISABLED, true),
        "enable" => (flags::DISABLED, false),
        other => bail!("unknown flag {other:?}"),
    };
    if add {
        client.flag_add(mask).await.map_err(friendly)?;
    } else {
        client.flag_clear(mask).await.map_err(friendly)?;
    }
    println!("Flag updated.");
    Ok(())
}

pub async fn label<R, W>(client: Client<'_, R, W>, args: &LabelArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client
        .set_str(FieldId::Label, &args.label)
        .await
        .map_err(friendly)?;
    println!("Label updated.");
    Ok(())
}

pub async fn contact<R, W>(client: Client<'_, R, W>, args: &ContactArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client
        .set_str(FieldId::Contact, &args.contact)
        .await
        .map_err(friendly)?;
    println!("Contact updated.");
    Ok(())
}

pub async fn spass<R, W>(client: Client<'_, R, W>, args: &SpassArgs) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outcome = match (&args.password, args.unset) {
        (Some(password), false) => client.set_spass(Some(password)).await.map_err(friendly)?,
        (None, true) => client.set_spass(None).await.map_err(friendly)?,
        _ => bail!("provide a password or --unset"),
    };
    match outcome {
        SpassOutcome::Set => println!("Static password set."),
        SpassOutcome::Unset => println!("Static password unset."),
    }
    Ok(())
}

pub async fn alphabets<R, W>(client: Client<'_, R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for id in otpcard_agent::alphabet::ALPHABET_IDS {
        match client.get_alphabet(*id).await {
            Ok(chars) => println!("{id}: {chars}"),
            Err(AgentError::Range) => {}
            Err(err) => return Err(friendly(err)),
        }
    }
    Ok(())
}

pub async fn warnings<R, W>(client: Client<'_, R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client.state_load().await.map_err(friendly)?;
    let (conditions, failures) = client.get_warnings().await.map_err(friendly)?;

    if conditions == 0 {
        println!("No warnings.");
    }
    if conditions & warnings::LAST_CARD != 0 {
        println!("You are on the last passcard; generate a new key soon.");
    }
    if conditions & warnings::NOTHING_LEFT != 0 {
        println!("No passcodes left; you must generate a new key.");
    }
    if conditions & warnings::RECENT_FAILURES != 0 {
        println!("There were {failures} recent authentication failures.");
    }
    if conditions & warnings::DISABLED != 0 {
        println!("OTP authentication is disabled for this account.");
    }

    client.state_drop().await.map_err(friendly)?;
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
