// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The remote side of the writer: a bulk `PutRecords` call.
//!
//! The flusher only depends on [`KinesisClient`], so tests and alternative
//! transports can stand in for the AWS SDK client.

use async_trait::async_trait;
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use std::fmt;

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Destination stream, addressed either by ARN or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamId {
    Arn(String),
    Name(String),
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arn(arn) => write!(f, "{arn}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordsEntry {
    pub data: Vec<u8>,
    pub partition_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordsRequest {
    pub stream: StreamId,
    pub entries: Vec<PutRecordsEntry>,
}

/// Outcome of a single record within a `PutRecords` call.
///
/// A record without `error_code` was accepted by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsResultEntry {
    pub sequence_number: Option<String>,
    pub shard_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Per-record results, positionally aligned with the request entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsResponse {
    pub records: Vec<PutRecordsResultEntry>,
    pub failed_record_count: Option<i32>,
}

#[async_trait]
pub trait KinesisClient: Send + Sync {
    /// Submits every entry in one call. An `Err` means no per-record outcome
    /// is known and the whole request must be considered failed.
    async fn put_records(&self, request: PutRecordsRequest)
        -> Result<PutRecordsResponse, ClientError>;
}

#[async_trait]
impl KinesisClient for aws_sdk_kinesis::Client {
    async fn put_records(
        &self,
        request: PutRecordsRequest,
    ) -> Result<PutRecordsResponse, ClientError> {
        let entries = request
            .entries
            .into_iter()
            .map(|entry| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(entry.data))
                    .partition_key(entry.partition_key)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let call = aws_sdk_kinesis::Client::put_records(self).set_records(Some(entries));
        let call = match request.stream {
            StreamId::Arn(arn) => call.stream_arn(arn),
            StreamId::Name(name) => call.stream_name(name),
        };
        let output = call
            .send()
            .await
            .map_err(|e| DisplayErrorContext(e).to_string())?;

        let records = output
            .records()
            .iter()
            .map(|record| PutRecordsResultEntry {
                sequence_number: record.sequence_number().map(str::to_owned),
                shard_id: record.shard_id().map(str::to_owned),
                error_code: record.error_code().map(str::to_owned),
                error_message: record.error_message().map(str::to_owned),
            })
            .collect();

        Ok(PutRecordsResponse {
            records,
            failed_record_count: output.failed_record_count(),
        })
    }
}
