// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use kinesis_writer::splitter::{LineSplitter, Splitter, WordSplitter};
use kinesis_writer::{StreamId, WriterConfig};

pub const STREAM_ARN: &str = "KINESIS_WRITER_STREAM_ARN";
pub const STREAM_NAME: &str = "KINESIS_WRITER_STREAM_NAME";
pub const RECORD_WINDOW: &str = "KINESIS_WRITER_RECORD_WINDOW";
pub const WRITE_TIMEOUT_MS: &str = "KINESIS_WRITER_WRITE_TIMEOUT_MS";
pub const FLUSH_TIMEOUT_MS: &str = "KINESIS_WRITER_FLUSH_TIMEOUT_MS";
pub const FLUSH_INTERVAL_MS: &str = "KINESIS_WRITER_FLUSH_INTERVAL_MS";
pub const SPLIT: &str = "KINESIS_WRITER_SPLIT";
pub const TEE: &str = "KINESIS_WRITER_TEE";

pub struct Config {
    pub stream: StreamId,
    pub writer: WriterConfig,
    /// Echo every line read from stdin to stdout.
    pub tee: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let stream = match (lookup(STREAM_ARN), lookup(STREAM_NAME)) {
            (Some(arn), _) if !arn.is_empty() => StreamId::Arn(arn),
            (_, Some(name)) if !name.is_empty() => StreamId::Name(name),
            _ => anyhow::bail!("either {STREAM_ARN} or {STREAM_NAME} must be set"),
        };

        let defaults = WriterConfig::default();
        let splitter: Arc<dyn Splitter> = match lookup(SPLIT).as_deref() {
            None | Some("lines") => Arc::new(LineSplitter),
            Some("words") => Arc::new(WordSplitter),
            Some(other) => anyhow::bail!("{SPLIT} must be `lines` or `words`, got `{other}`"),
        };

        let writer = WriterConfig {
            splitter,
            record_window: parse_or(&lookup, RECORD_WINDOW, defaults.record_window),
            write_timeout: millis_or(&lookup, WRITE_TIMEOUT_MS, defaults.write_timeout),
            flush_timeout: millis_or(&lookup, FLUSH_TIMEOUT_MS, defaults.flush_timeout),
            flush_interval: millis_or(&lookup, FLUSH_INTERVAL_MS, defaults.flush_interval),
            ..defaults
        };
        writer.validate()?;

        let tee = lookup(TEE)
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Config {
            stream,
            writer,
            tee,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    parse(lookup, key).unwrap_or(default)
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    parse(lookup, key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// `None` when the variable is unset or does not parse.
fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!("Ignoring invalid {key}={raw}, using the default");
    }
    parsed
}
