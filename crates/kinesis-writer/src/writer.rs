// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::buffer_service::{BufferHandle, BufferOptions, BufferService};
use crate::client::{KinesisClient, StreamId};
use crate::config::WriterConfig;
use crate::errors::Error;
use crate::flusher::Flusher;
use crate::splitter::Splitter;

/// Writes log records to a Kinesis stream.
///
/// `write` splits its input into records and buffers them; batches are sent
/// when the record window fills, when the flush interval elapses, on `sync`
/// and on `close`. Safe to share between tasks.
pub struct Writer {
    splitter: Arc<dyn Splitter>,
    buffer: BufferHandle,
    closed: AtomicBool,
    service: Mutex<Option<JoinHandle<()>>>,
}

impl Writer {
    /// Creates a writer for `stream` and starts its background tasks.
    ///
    /// Without an injected client, one is built from the ambient AWS
    /// configuration (environment, profile, instance metadata).
    pub async fn new(stream: StreamId, config: WriterConfig) -> Result<Self, Error> {
        config.validate()?;

        let client: Arc<dyn KinesisClient> = match config.client.clone() {
            Some(client) => client,
            None => {
                let sdk_config =
                    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                Arc::new(aws_sdk_kinesis::Client::new(&sdk_config))
            }
        };

        let flusher = Flusher::new(
            client,
            stream,
            config.flush_timeout,
            config.retry_policy(),
        );
        let (service, buffer) = BufferService::new(
            flusher,
            Arc::clone(&config.error_handler),
            &BufferOptions {
                record_window: config.record_window,
                capacity: config.buffer_capacity,
                write_timeout: config.write_timeout,
                flush_timeout: config.flush_timeout,
                flush_interval: config.flush_interval,
            },
        );
        let service = tokio::spawn(service.run());
        debug!("KINESIS | Writer started: {config:?}");

        Ok(Writer {
            splitter: config.splitter,
            buffer,
            closed: AtomicBool::new(false),
            service: Mutex::new(Some(service)),
        })
    }

    /// Splits `data` into records and buffers each of them.
    ///
    /// Returns the number of bytes consumed. On error, records split before
    /// the failing one have already been buffered; callers are expected to
    /// treat any error as "the whole write failed".
    pub async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        for record in self.splitter.split(data) {
            self.buffer.enqueue(record.to_vec()).await?;
        }
        Ok(data.len())
    }

    /// Sends whatever is buffered and waits for the delivery to finish.
    pub async fn sync(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.buffer.flush_now().await
    }

    /// Flushes buffered records, waits for in-flight deliveries and stops
    /// the background tasks. Later calls return `Ok` without doing anything.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.buffer.shutdown().await;

        let service = self.service.lock().await.take();
        if let Some(service) = service {
            // past the deadline the service may still be delivering; leave it be
            if !matches!(result, Err(Error::DeadlineExceeded(_))) {
                if let Err(e) = service.await {
                    error!("KINESIS | Buffer service failed: {e}");
                }
            }
        }
        debug!("KINESIS | Writer closed");
        result
    }
}
