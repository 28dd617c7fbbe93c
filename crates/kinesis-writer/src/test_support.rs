// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory Kinesis stand-in shared by the unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::client::{
    ClientError, KinesisClient, PutRecordsRequest, PutRecordsResponse, PutRecordsResultEntry,
};
use crate::errors::Error;
use crate::Record;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Rejects every entry at an odd position, on every call.
    FailOddIndices,
    FailAll,
    Transport,
    /// Rejects odd positions on the first call, then fails every call outright.
    FailOddThenTransport,
    /// Never answers.
    Hang,
}

pub struct RecordingClient {
    behavior: Behavior,
    requests: Mutex<Vec<PutRecordsRequest>>,
}

impl RecordingClient {
    pub fn new(behavior: Behavior) -> Self {
        RecordingClient {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PutRecordsRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    /// Payloads of every call, as strings, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.requests()
            .iter()
            .map(|request| {
                request
                    .entries
                    .iter()
                    .map(|entry| String::from_utf8_lossy(&entry.data).into_owned())
                    .collect()
            })
            .collect()
    }
}

fn respond(entries: usize, fails: impl Fn(usize) -> bool) -> PutRecordsResponse {
    let mut failed_record_count = 0;
    let records = (0..entries)
        .map(|i| {
            if fails(i) {
                failed_record_count += 1;
                PutRecordsResultEntry {
                    error_code: Some("InternalFailure".to_string()),
                    error_message: Some("Internal service failure.".to_string()),
                    ..Default::default()
                }
            } else {
                PutRecordsResultEntry {
                    sequence_number: Some(format!("{}", 49_000 + i)),
                    shard_id: Some("shardId-000000000000".to_string()),
                    ..Default::default()
                }
            }
        })
        .collect();
    PutRecordsResponse {
        records,
        failed_record_count: Some(failed_record_count),
    }
}

#[async_trait]
impl KinesisClient for RecordingClient {
    async fn put_records(
        &self,
        request: PutRecordsRequest,
    ) -> Result<PutRecordsResponse, ClientError> {
        let entries = request.entries.len();
        let call = {
            let mut requests = self.requests.lock().expect("lock poisoned");
            requests.push(request);
            requests.len()
        };
        match self.behavior {
            Behavior::Succeed => Ok(respond(entries, |_| false)),
            Behavior::FailOddIndices => Ok(respond(entries, |i| i % 2 != 0)),
            Behavior::FailAll => Ok(respond(entries, |_| true)),
            Behavior::Transport => Err("connection reset by peer".into()),
            Behavior::FailOddThenTransport if call == 1 => Ok(respond(entries, |i| i % 2 != 0)),
            Behavior::FailOddThenTransport => Err("connection reset by peer".into()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

pub fn records(values: &[&str]) -> Vec<Record> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

/// Error handler that keeps every report for later assertions.
pub fn capturing_handler() -> (crate::config::ErrorHandler, Arc<Mutex<Vec<(Error, Vec<Record>)>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let handler: crate::config::ErrorHandler = Arc::new(move |error: &Error, records: &[Record]| {
        sink.lock()
            .expect("lock poisoned")
            .push((error.clone(), records.to_vec()));
    });
    (handler, reports)
}
