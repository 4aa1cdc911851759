// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use otpcard::cli::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OTPCARD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .init();

    let cli = Cli::parse();
    match otpcard::run(cli).await {
        Ok(()) => {}
        Err(err) => {
            error!("fatal: {err:#}");
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
