// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch to Kinesis, retrying only the records the service
//! rejected.
//!
//! ```text
//!   batch ──> PutRecords ──> all accepted? ──yes──> done
//!                 │                │
//!           call failed            no
//!                 │                v
//!                 v          sleep (5s, then up to 2x)
//!           Transport error        │
//!                                  v
//!                       PutRecords(failed subset) ──> ... ──> DeliveryExhausted
//! ```
//!
//! The whole ladder shares one deadline derived from the flush timeout. A
//! failed call (as opposed to rejected records) is not retried here: the SDK
//! client already retries transient transport errors.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, warn};

use crate::client::{
    KinesisClient, PutRecordsEntry, PutRecordsRequest, PutRecordsResponse, StreamId,
};
use crate::config::RetryPolicy;
use crate::errors::Error;
use crate::Record;

/// A flush that did not deliver everything.
///
/// `undelivered` holds the exact payloads that were dropped, in submission
/// order, ready to be handed to the error handler.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct FlushFailure {
    pub error: Error,
    pub undelivered: Vec<Record>,
}

#[derive(Clone)]
pub struct Flusher {
    client: Arc<dyn KinesisClient>,
    stream: StreamId,
    flush_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl Flusher {
    pub fn new(
        client: Arc<dyn KinesisClient>,
        stream: StreamId,
        flush_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Self {
        Flusher {
            client,
            stream,
            flush_timeout,
            retry_policy,
        }
    }

    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Delivers `records`, retrying rejected ones until they are accepted,
    /// the retry budget is spent or the flush deadline would be overrun.
    pub async fn flush(&self, records: Vec<Record>) -> Result<(), FlushFailure> {
        if records.is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + self.flush_timeout;

        let mut pending = self.put_records(records, deadline).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut retries = 0;
        while retries < self.retry_policy.max_retries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(delay) = self.retry_policy.delay_within(retries, remaining) else {
                debug!("KINESIS | Retry budget cut short: {remaining:?} left before the deadline");
                break;
            };
            warn!(
                "KINESIS | Retrying in {:?}: {} records are failed",
                delay,
                pending.len()
            );
            sleep(delay).await;
            retries += 1;

            pending = self.put_records(pending, deadline).await?;
            if pending.is_empty() {
                debug!("KINESIS | All records delivered after {retries} retries");
                return Ok(());
            }
        }

        error!(
            "KINESIS | Giving up on {} records after {} retries",
            pending.len(),
            retries
        );
        Err(FlushFailure {
            error: Error::DeliveryExhausted {
                undelivered: pending.len(),
                retries,
            },
            undelivered: pending,
        })
    }

    /// One `PutRecords` call. Returns the records the service rejected.
    async fn put_records(
        &self,
        records: Vec<Record>,
        deadline: Instant,
    ) -> Result<Vec<Record>, FlushFailure> {
        let request = PutRecordsRequest {
            stream: self.stream.clone(),
            entries: records
                .iter()
                .map(|data| PutRecordsEntry {
                    data: data.clone(),
                    partition_key: partition_key(),
                })
                .collect(),
        };

        let response = match timeout_at(deadline, self.client.put_records(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("KINESIS | Failed to put {} records: {e}", records.len());
                return Err(FlushFailure {
                    error: Error::Transport(e.to_string()),
                    undelivered: records,
                });
            }
            Err(_) => {
                error!(
                    "KINESIS | Put of {} records exceeded the {:?} flush deadline",
                    records.len(),
                    self.flush_timeout
                );
                return Err(FlushFailure {
                    error: Error::DeadlineExceeded(self.flush_timeout),
                    undelivered: records,
                });
            }
        };

        let submitted = records.len();
        let failed = rejected_records(records, &response);
        debug!(
            "KINESIS | Put {} records to {}: {} delivered, {} failed",
            submitted,
            self.stream,
            submitted - failed.len(),
            failed.len()
        );
        Ok(failed)
    }
}

/// Fresh random key per entry and per attempt; records carry no identity.
fn partition_key() -> String {
    rand::random::<u64>().to_string()
}

/// Picks the records whose result carries an error code. A record without a
/// matching result entry is treated as rejected.
fn rejected_records(records: Vec<Record>, response: &PutRecordsResponse) -> Vec<Record> {
    if response.failed_record_count == Some(0) {
        return Vec::new();
    }
    records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            response
                .records
                .get(*i)
                .map_or(true, |result| result.error_code.is_some())
        })
        .map(|(_, record)| record)
        .collect()
}
