// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that spawn the real `otpcard-agent` binary and drive
//! it through the client library, pipe to pipe.

use otpcard_agent::error::AgentError;
use otpcard_agent::state::{flags, FieldId};
use otpcard_agent::supervisor;

use otpcard_specs::AgentFixture;

// -- handshake ----------------------------------------------------------------

#[tokio::test]
async fn handshake_then_disconnect() -> anyhow::Result<()> {
    let fixture = AgentFixture::new()?;
    let connection = fixture.connect().await.map_err(anyhow::Error::from)?;
    connection.disconnect().await.map_err(anyhow::Error::from)?;
    Ok(())
}

#[tokio::test]
async fn connect_fails_cleanly_for_missing_binary() {
    let result = supervisor::connect(std::path::Path::new("/nonexistent/agent")).await;
    assert!(matches!(result.map(|_| ()), Err(AgentError::IoError)));
}

#[tokio::test]
async fn broken_config_is_reported_through_the_init_frame() -> anyhow::Result<()> {
    let fixture = AgentFixture::with_policy("allow_everything = 1\n")?;
    let result = fixture.connect().await;
    assert!(matches!(result.map(|_| ()), Err(AgentError::Internal)));
    Ok(())
}

// -- policy denial ------------------------------------------------------------

#[tokio::test]
async fn key_generation_denied_by_policy() -> anyhow::Result<()> {
    let fixture = AgentFixture::with_policy("allow_key_generation = 0\n")?;
    let mut connection = fixture.connect().await.map_err(anyhow::Error::from)?;

    let denied = connection.client.key_generate().await;
    assert_eq!(denied, Err(AgentError::PolicyDenied));

    // No state file appeared.
    let leftovers: Vec<_> = std::fs::read_dir(fixture.state_dir())?.collect();
    assert!(leftovers.is_empty());

    connection.disconnect().await.map_err(anyhow::Error::from)?;
    Ok(())
}

// -- full user journey --------------------------------------------------------

#[tokio::test]
async fn generate_configure_store_and_authenticate() -> anyhow::Result<()> {
    let fixture = AgentFixture::new()?;
    let mut connection = fixture.connect().await.map_err(anyhow::Error::from)?;
    let client = &mut connection.client;

    // Assemble a fresh state and persist it.
    client.state_new().await.map_err(anyhow::Error::from)?;
    client
        .set_str(FieldId::Label, "e2e card")
        .await
        .map_err(anyhow::Error::from)?;
    client.key_generate().await.map_err(anyhow::Error::from)?;
    client.state_store().await.map_err(anyhow::Error::from)?;

    // Flag mutation persists (fresh session state no longer bound).
    client.flag_add(flags::SKIP).await.map_err(anyhow::Error::from)?;
    let flagged = client.flag_get().await.map_err(anyhow::Error::from)?;
    assert_eq!(flagged & flags::SKIP, flags::SKIP);

    // Fetch the current passcode and burn it through authentication.
    let counter = client
        .get_num(FieldId::Counter)
        .await
        .map_err(anyhow::Error::from)?;
    let code = client
        .get_passcode(counter)
        .await
        .map_err(anyhow::Error::from)?;
    assert_eq!(client.authenticate(&code).await, Ok(()));

    // The same passcode never authenticates twice.
    assert_eq!(client.authenticate(&code).await, Err(AgentError::AuthFailed));

    // The label survived the round trip to disk.
    let label = client
        .get_str(FieldId::Label)
        .await
        .map_err(anyhow::Error::from)?;
    assert_eq!(label, "e2e card");

    connection.disconnect().await.map_err(anyhow::Error::from)?;
    Ok(())
}

#[tokio::test]
async fn state_survives_across_sessions() -> anyhow::Result<()> {
    let fixture = AgentFixture::new()?;

    let mut connection = fixture.connect().await.map_err(anyhow::Error::from)?;
    connection.client.state_new().await.map_err(anyhow::Error::from)?;
    connection.client.key_generate().await.map_err(anyhow::Error::from)?;
    // The salted counter base is random per key; a match across sessions
    // proves the same state was reloaded.
    let counter = connection
        .client
        .get_num(FieldId::Counter)
        .await
        .map_err(anyhow::Error::from)?;
    connection.client.state_store().await.map_err(anyhow::Error::from)?;
    connection.disconnect().await.map_err(anyhow::Error::from)?;

    // A second agent process sees the stored state.
    let mut connection = fixture.connect().await.map_err(anyhow::Error::from)?;
    connection.client.state_load().await.map_err(anyhow::Error::from)?;
    let reread = connection
        .client
        .get_num(FieldId::Counter)
        .await
        .map_err(anyhow::Error::from)?;
    assert_eq!(reread, counter);
    connection.disconnect().await.map_err(anyhow::Error::from)?;
    Ok(())
}

#[tokio::test]
async fn key_removal_end_to_end() -> anyhow::Result<()> {
    let fixture = AgentFixture::new()?;
    let mut connection = fixture.connect().await.map_err(anyhow::Error::from)?;
    let client = &mut connection.client;

    client.state_new().await.map_err(anyhow::Error::from)?;
    client.key_generate().await.map_err(anyhow::Error::from)?;
    client.state_store().await.map_err(anyhow::Error::from)?;

    client.key_remove().await.map_err(anyhow::Error::from)?;
    assert_eq!(client.state_load().await, Err(AgentError::NoState));

    connection.disconnect().await.map_err(anyhow::Error::from)?;
    Ok(())
}
