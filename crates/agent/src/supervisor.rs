// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawns the privileged agent and performs the initial handshake
//! (client side), and bootstraps the dispatcher over stdin/stdout
//! (server side).

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{error, info, warn};

use crate::channel::{FramedChannel, HANDSHAKE_TIMEOUT};
use crate::client::AgentClient;
use crate::config::{self, PolicyConfig};
use crate::dispatch::Dispatcher;
use crate::error::AgentError;
use crate::frame::{Frame, RequestKind};
use crate::security;
use crate::session::Session;

/// Exit code reserved for "could not exec the agent binary".
pub const EXIT_EXEC_FAILURE: i32 = 5;

/// Knobs for [`connect_with`]. The handshake timeout is a liveness bound,
/// not a correctness one.
pub struct ConnectOptions {
    pub handshake_timeout: Duration,
    /// Extra environment for the child (e.g. a config path override).
    pub env: Vec<(OsString, OsString)>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            env: Vec::new(),
        }
    }
}

/// A connected agent child process. Dropping it kills the child.
pub struct AgentConnection {
    pub client: AgentClient<ChildStdout, ChildStdin>,
    child: Child,
}

impl AgentConnection {
    /// Orderly shutdown: ask the agent to disconnect, then reap it.
    pub async fn disconnect(self) -> Result<(), AgentError> {
        let AgentConnection { client, mut child } = self;
        let result = client.disconnect().await;
        match child.wait().await {
            Ok(status) => info!(?status, "agent exited"),
            Err(err) => warn!(%err, "failed to reap agent"),
        }
        result
    }
}

/// Spawn the agent binary and wait for its Init frame.
pub async fn connect(agent_path: &Path) -> Result<AgentConnection, AgentError> {
    connect_with(agent_path, ConnectOptions::default()).await
}

pub async fn connect_with(
    agent_path: &Path,
    options: ConnectOptions,
) -> Result<AgentConnection, AgentError> {
    let mut command = Command::new(agent_path);
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    for (key, value) in &options.env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|err| {
        error!(path = %agent_path.display(), %err, "failed to spawn agent");
        AgentError::IoError
    })?;
    let stdin = child.stdin.take().ok_or(AgentError::Internal)?;
    let stdout = child.stdout.take().ok_or(AgentError::Internal)?;
    let mut channel = FramedChannel::new(stdout, stdin);

    // A dead or wedged child must not hang the login stack.
    match handshake(&mut channel, options.handshake_timeout).await {
        Ok(()) => {
            info!("agent connection initialized");
            Ok(AgentConnection {
                client: AgentClient::new(channel),
                child,
            })
        }
        Err(err) => {
            error!(%err, "agent handshake failed");
            child.start_kill().ok();
            child.wait().await.ok();
            Err(err)
        }
    }
}

async fn handshake<R, W>(
    channel: &mut FramedChannel<R, W>,
    timeout: Duration,
) -> Result<(), AgentError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    channel.wait_ready(timeout).await?;
    let init = channel.recv().await?;
    if init.request() != Some(RequestKind::Init) {
        return Err(AgentError::BadRequest);
    }
    AgentError::from_status(init.status)
}

/// Server side: adopt stdin/stdout, report startup status through the Init
/// frame, then serve requests until the session ends.
///
/// Startup failures are reported via the frame, never via the exit status;
/// the supervisor on the other end decides what to tell the user.
pub async fn run_agent() -> Result<(), AgentError> {
    let privileged = security::is_privileged();
    let startup = agent_startup(privileged);

    let channel = FramedChannel::new(tokio::io::stdin(), tokio::io::stdout());
    match startup {
        Ok((policy, username)) => {
            let session = Session::new(username, privileged);
            let mut dispatcher = Dispatcher::new(channel, policy, session);
            dispatcher.send_init(Ok(())).await?;
            dispatcher.run().await
        }
        Err(err) => {
            error!(%err, "agent startup failed");
            let mut channel = channel;
            let mut frame = Frame::new(RequestKind::Init);
            frame.status = err.code();
            channel.send(&frame).await.ok();
            Err(err)
        }
    }
}

fn agent_startup(privileged: bool) -> Result<(PolicyConfig, String), AgentError> {
    let path = config::config_path();
    let policy = config::load(&path).map_err(|err| {
        error!(path = %path.display(), "config load failed: {err:#}");
        AgentError::Internal
    })?;
    config::preflight(&path, &policy, privileged)?;
    let username = security::current_username()?;
    Ok((policy, username))
}
