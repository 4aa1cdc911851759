// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod actions;
pub mod cli;

use anyhow::Context;

use otpcard_agent::supervisor::{self, ConnectOptions};

use crate::cli::{Cli, Command};

/// Connect to the agent, run the selected action, disconnect.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let agent_path = cli.agent_path()?;
    let mut options = ConnectOptions::default();
    if let Some(config) = &cli.config {
        options.env.push((
            otpcard_agent::config::CONFIG_PATH_ENV.into(),
            config.clone().into_os_string(),
        ));
    }

    let mut connection = supervisor::connect_with(&agent_path, options)
        .await
        .map_err(|err| anyhow::anyhow!(err.message()))
        .with_context(|| format!("connecting to agent {}", agent_path.display()))?;

    if let Some(user) = &cli.user {
        connection
            .client
            .user_set(user)
            .await
            .map_err(|err| anyhow::anyhow!(err.message()))
            .context("binding session to user")?;
    }

    let client = &mut connection.client;
    let result = match &cli.command {
        Command::Key(args) => actions::key_generate(client, args, cli.yes).await,
        Command::Remove => actions::key_remove(client, cli.yes).await,
        Command::Info => actions::info(client).await,
        Command::Passcode(args) => actions::passcode(client, args).await,
        Command::Prompt => actions::prompt(client).await,
        Command::Skip(args) => actions::skip(client, args).await,
        Command::Auth(args) => actions::auth(client, args).await,
        Command::Flag(args) => actions::flag(client, args).await,
        Command::Label(args) => actions::label(client, args).await,
        Command::Contact(args) => actions::contact(client, args).await,
        Command::Spass(args) => actions::spass(client, args).await,
        Command::Alphabets => actions::alphabets(client).await,
        Command::Warnings => actions::warnings(client).await,
    };

    // Part cleanly even after an action error; the action result wins.
    if let Err(err) = connection.disconnect().await {
        tracing::warn!("disconnect failed: {err}");
    }
    result
}
