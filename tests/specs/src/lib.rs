// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end agent tests.
//!
//! Spawns the real `otpcard-agent` binary with an isolated config and
//! state directory, exactly the way the CLI front-end does.

use std::path::{Path, PathBuf};

use otpcard_agent::config::CONFIG_PATH_ENV;
use otpcard_agent::error::AgentError;
use otpcard_agent::security::DROP_PRIVILEGE_ENV;
use otpcard_agent::supervisor::{self, AgentConnection, ConnectOptions};

/// Resolve the path to the compiled `otpcard-agent` binary.
pub fn agent_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("otpcard-agent")
}

/// An isolated agent environment: config file plus empty state directory,
/// removed on drop.
pub struct AgentFixture {
    dir: tempfile::TempDir,
    config_path: PathBuf,
}

impl AgentFixture {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_policy("")
    }

    /// Create a fixture whose config carries `extra` policy lines on top of
    /// the isolated db/state settings.
    pub fn with_policy(extra: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let state_dir = dir.path().join("state");
        std::fs::create_dir(&state_dir)?;

        let config_path = dir.path().join("otpcard.conf");
        let contents = format!(
            "db = global\nstate_dir = {}\n{extra}",
            state_dir.display()
        );
        std::fs::write(&config_path, contents)?;

        Ok(Self { dir, config_path })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    /// Spawn the agent against this fixture as an unprivileged caller.
    pub async fn connect(&self) -> Result<AgentConnection, AgentError> {
        let mut options = ConnectOptions::default();
        options.env.push((
            CONFIG_PATH_ENV.into(),
            self.config_path.clone().into_os_string(),
        ));
        options.env.push((DROP_PRIVILEGE_ENV.into(), "1".into()));
        supervisor::connect_with(&agent_binary(), options).await
    }
}
