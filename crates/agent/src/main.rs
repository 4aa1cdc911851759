// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing::error;

#[tokio::main]
async fn main() {
    // Stdout carries the protocol; logs go to stderr, which the production
    // supervisor nulls. Useful when running the agent by hand.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OTPCARD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match otpcard_agent::supervisor::run_agent().await {
        Ok(()) => {}
        Err(err) => {
            error!("fatal: {err}");
            std::process::exit(1);
        }
    }
}
