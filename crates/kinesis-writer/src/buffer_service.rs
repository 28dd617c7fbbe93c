// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor-based batching of records ahead of delivery.
//!
//! Producers hold cloneable [`BufferHandle`]s and send commands over a bounded
//! channel. A single [`BufferService`] task owns the current batch, so every
//! flush trigger (record window, flush interval, explicit sync, close) goes
//! through the same cut: swap the batch for an empty one and hand it to the
//! delivery task.
//!
//! ```text
//!    handles ──commands──> BufferService ──FlushJob──> DeliveryWorker ──> Flusher
//!                           (owns batch)   (one at a time)   │
//!                                                            └──> error handler
//! ```
//!
//! Delivery is strictly sequential: the job channel holds a single pending
//! batch, and while one batch is in flight the next keeps accumulating. When
//! both are busy the command channel fills up and `enqueue` waits, up to the
//! write timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::config::ErrorHandler;
use crate::errors::Error;
use crate::flusher::{FlushFailure, Flusher};
use crate::Record;

type Responder = oneshot::Sender<Result<(), Error>>;

#[derive(Debug)]
pub enum BufferCommand {
    Insert(Record),
    Flush(Responder),
    Shutdown(Responder),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    RecordWindow,
    Interval,
    Sync,
    Close,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RecordWindow => "record window",
            Self::Interval => "flush interval",
            Self::Sync => "sync",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// A batch cut from the buffer, owned by exactly one delivery.
#[derive(Debug)]
struct FlushJob {
    records: Vec<Record>,
    trigger: FlushTrigger,
    responder: Option<Responder>,
}

#[derive(Debug, Clone)]
pub struct BufferOptions {
    pub record_window: usize,
    pub capacity: usize,
    pub write_timeout: Duration,
    pub flush_timeout: Duration,
    pub flush_interval: Duration,
}

/// Cloneable entry point to a running [`BufferService`].
#[derive(Clone, Debug)]
pub struct BufferHandle {
    tx: mpsc::Sender<BufferCommand>,
    write_timeout: Duration,
    flush_timeout: Duration,
}

impl BufferHandle {
    /// Adds a record to the current batch, waiting at most the write timeout
    /// for room in the command channel.
    pub async fn enqueue(&self, record: Record) -> Result<(), Error> {
        match timeout(self.write_timeout, self.tx.send(BufferCommand::Insert(record))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::EnqueueTimeout(self.write_timeout)),
        }
    }

    /// Flushes the current batch and waits for its delivery, retries included.
    ///
    /// Succeeds without a remote call when the batch is empty.
    pub async fn flush_now(&self) -> Result<(), Error> {
        self.request(BufferCommand::Flush).await
    }

    /// Stops accepting records, flushes what is buffered and waits for every
    /// in-flight delivery to finish.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.request(BufferCommand::Shutdown).await
    }

    async fn request(&self, command: fn(Responder) -> BufferCommand) -> Result<(), Error> {
        let (response_tx, response_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(command(response_tx))
                .await
                .map_err(|_| Error::Closed)?;
            response_rx.await.map_err(|_| Error::Closed)?
        };
        timeout(self.flush_timeout, exchange)
            .await
            .map_err(|_| Error::DeadlineExceeded(self.flush_timeout))?
    }
}

/// Owns the current batch and decides when it is cut.
pub struct BufferService {
    rx: mpsc::Receiver<BufferCommand>,
    batch: Vec<Record>,
    record_window: usize,
    flush_interval: Duration,
    jobs: mpsc::Sender<FlushJob>,
    worker: Option<DeliveryWorker>,
}

impl BufferService {
    /// Returns the service (to be spawned) and a handle to feed it.
    #[must_use]
    pub fn new(
        flusher: Flusher,
        error_handler: ErrorHandler,
        options: &BufferOptions,
    ) -> (Self, BufferHandle) {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let (jobs, jobs_rx) = mpsc::channel(1);

        let service = BufferService {
            rx,
            batch: Vec::with_capacity(options.record_window),
            record_window: options.record_window.max(1),
            flush_interval: options.flush_interval,
            jobs,
            worker: Some(DeliveryWorker {
                flusher,
                error_handler,
                jobs: jobs_rx,
            }),
        };
        let handle = BufferHandle {
            tx,
            write_timeout: options.write_timeout,
            flush_timeout: options.flush_timeout,
        };
        (service, handle)
    }

    /// Processes commands until shutdown or until every handle is dropped,
    /// then waits for the delivery task to drain.
    pub async fn run(mut self) {
        debug!("KINESIS | Buffer service started");
        let worker = self.worker.take().map(|worker| tokio::spawn(worker.run()));

        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(BufferCommand::Shutdown(responder)) => {
                        self.drain(responder).await;
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!("KINESIS | All buffer handles dropped");
                        self.cut(FlushTrigger::Close, None).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.cut(FlushTrigger::Interval, None).await;
                    }
                }
            }
        }

        let BufferService { jobs, .. } = self;
        drop(jobs);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("KINESIS | Delivery task failed: {e}");
            }
        }
        debug!("KINESIS | Buffer service stopped");
    }

    async fn handle(&mut self, command: BufferCommand) {
        match command {
            BufferCommand::Insert(record) => {
                self.batch.push(record);
                if self.batch.len() >= self.record_window {
                    self.cut(FlushTrigger::RecordWindow, None).await;
                }
            }
            BufferCommand::Flush(responder) => {
                if self.batch.is_empty() {
                    let _ = responder.send(Ok(()));
                } else {
                    self.cut(FlushTrigger::Sync, Some(responder)).await;
                }
            }
            BufferCommand::Shutdown(responder) => {
                // Only reachable while draining; the first shutdown answers.
                let _ = responder.send(Ok(()));
            }
        }
    }

    /// Refuses new commands, processes those already queued, then sends a
    /// final job that answers `responder` once every earlier delivery is done.
    async fn drain(&mut self, responder: Responder) {
        self.rx.close();
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        let records = std::mem::take(&mut self.batch);
        debug!(
            "KINESIS | Closing buffer with {} buffered records",
            records.len()
        );
        self.hand_off(FlushJob {
            records,
            trigger: FlushTrigger::Close,
            responder: Some(responder),
        })
        .await;
    }

    /// Swaps the current batch for an empty one and hands it to delivery.
    async fn cut(&mut self, trigger: FlushTrigger, responder: Option<Responder>) {
        if self.batch.is_empty() {
            if let Some(responder) = responder {
                let _ = responder.send(Ok(()));
            }
            return;
        }
        let records = std::mem::replace(&mut self.batch, Vec::with_capacity(self.record_window));
        self.hand_off(FlushJob {
            records,
            trigger,
            responder,
        })
        .await;
    }

    async fn hand_off(&mut self, job: FlushJob) {
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job).await {
            error!(
                "KINESIS | Delivery task is gone, dropping {} records",
                job.records.len()
            );
            if let Some(responder) = job.responder {
                let _ = responder.send(Err(Error::Closed));
            }
        }
    }
}

/// Delivers jobs one after another and reports terminal failures.
struct DeliveryWorker {
    flusher: Flusher,
    error_handler: ErrorHandler,
    jobs: mpsc::Receiver<FlushJob>,
}

impl DeliveryWorker {
    async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            self.deliver(job).await;
        }
        debug!("KINESIS | Delivery task stopped");
    }

    async fn deliver(&self, job: FlushJob) {
        let FlushJob {
            records,
            trigger,
            responder,
        } = job;

        let result = if records.is_empty() {
            Ok(())
        } else {
            debug!(
                "KINESIS | Flushing {} records to {} ({trigger})",
                records.len(),
                self.flusher.stream()
            );
            match self.flusher.flush(records).await {
                Ok(()) => Ok(()),
                Err(FlushFailure { error, undelivered }) => {
                    error!(
                        "KINESIS | Flush ({trigger}) dropped {} records: {error}",
                        undelivered.len()
                    );
                    self.report(error.clone(), undelivered).await;
                    Err(error)
                }
            }
        };

        if let Some(responder) = responder {
            if responder.send(result).is_err() {
                debug!("KINESIS | Flush ({trigger}) finished after its caller gave up");
            }
        }
    }

    /// Runs the user's error handler off the async workers since it may block.
    async fn report(&self, error: Error, records: Vec<Record>) {
        let handler = Arc::clone(&self.error_handler);
        if let Err(e) = tokio::task::spawn_blocking(move || handler(&error, &records)).await {
            error!("KINESIS | Error handler panicked: {e}");
        }
    }
}
