// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reads lines from stdin and ships them to a Kinesis stream, optionally
//! echoing them to stdout.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use anyhow::Context;
use std::env;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use kinesis_writer::Writer;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("KINESIS_WRITER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!(
        "aws_config=off,aws_smithy_runtime=off,h2=off,hyper=off,rustls=off,{}",
        log_level
    );

    // stdout carries the teed lines, so logs go to stderr
    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, flushing buffered records");
            signal_token.cancel();
        }
    });

    if let Err(e) = run(config, cancel_token).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(config: config::Config, cancel_token: CancellationToken) -> anyhow::Result<()> {
    info!("Shipping stdin to {}", config.stream);
    let writer = Writer::new(config.stream, config.writer)
        .await
        .context("failed to start the writer")?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            read = stdin.read_until(b'\n', &mut line) => read.context("failed to read stdin")?,
            _ = cancel_token.cancelled() => break,
        };
        if read == 0 {
            break;
        }
        if config.tee {
            stdout.write_all(&line).await.context("failed to write stdout")?;
        }
        if let Err(e) = writer.write(&line).await {
            warn!("Dropping line: {e}");
        }
    }
    if config.tee {
        stdout.flush().await.context("failed to write stdout")?;
    }

    writer
        .close()
        .await
        .context("failed to deliver buffered records")?;
    debug!("Input drained, exiting");
    Ok(())
}
