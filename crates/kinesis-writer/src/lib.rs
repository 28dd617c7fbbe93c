// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships log records to an AWS Kinesis data stream.
//!
//! Raw writes are split into records, buffered into batches of at most
//! `record_window` records and delivered with `PutRecords`. Records the
//! service rejects are retried with a bounded backoff; whatever is still
//! undelivered goes to a caller-supplied error handler. Delivery is
//! at-least-once and best-effort.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer_service;
pub mod client;
pub mod config;
pub mod errors;
pub mod flusher;
pub mod splitter;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use client::{KinesisClient, StreamId};
pub use config::{ErrorHandler, RetryPolicy, WriterConfig};
pub use errors::Error;
pub use writer::Writer;

/// One opaque log record.
pub type Record = Vec<u8>;
