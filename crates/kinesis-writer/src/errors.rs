// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced by the writer, the buffer service and the flusher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The buffer stayed full for the whole write timeout.
    #[error("timed out after {0:?} waiting for buffer capacity")]
    EnqueueTimeout(Duration),

    /// The writer was closed before the operation.
    #[error("writer is closed")]
    Closed,

    /// The bulk call failed as a whole, no per-record results are available.
    #[error("failed to put records: {0}")]
    Transport(String),

    /// Some records were still rejected once the retry budget was spent.
    #[error("failed to put records: {undelivered} records are failed after {retries} retries")]
    DeliveryExhausted { undelivered: usize, retries: u32 },

    /// A remote call or a flush wait outlived the flush timeout.
    #[error("flush deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
