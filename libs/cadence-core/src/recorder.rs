use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::CadenceError;
use crate::record::MessageRecord;
use crate::store::RecordingSession;

/// Final statistics for one recording session.
#[derive(Debug, Clone)]
pub struct RecorderStats {
    /// Messages delivered by the broker client.
    pub received: u64,
    /// Records flushed to the store file.
    pub persisted: u64,
    pub elapsed: Duration,
    pub file: PathBuf,
}

/// Consumes captured messages from a single-consumer channel and flushes
/// them into the owned [`RecordingSession`] in batches.
///
/// The channel is the mutual-exclusion discipline around the buffer: the
/// transport task only sends, this task only drains, so no record can be
/// lost or duplicated across a flush boundary. A full channel pushes back
/// on the transport task instead of dropping.
pub struct Recorder {
    session: RecordingSession,
    batch_size: usize,
    flush_interval: Duration,
    buffer: Vec<MessageRecord>,
    last_timestamp: f64,
    received: u64,
    persisted: u64,
}

impl Recorder {
    pub fn new(session: RecordingSession, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            session,
            batch_size: batch_size.max(1),
            flush_interval,
            buffer: Vec::new(),
            last_timestamp: 0.0,
            received: 0,
            persisted: 0,
        }
    }

    /// Run until the capture side closes the channel or `token` fires,
    /// then drain, flush and report.
    ///
    /// The buffer is flushed when it reaches `batch_size`, on every
    /// `flush_interval` tick (bounding data loss on crash), and once more
    /// during shutdown — whichever comes first. A failed flush keeps the
    /// batch for retry on the next trigger; only a failure during the
    /// final drain is fatal.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<MessageRecord>,
        token: CancellationToken,
    ) -> Result<RecorderStats, CadenceError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the timer
        // measures a full interval from session start.
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(record) => {
                        self.push(record);
                        if self.buffer.len() >= self.batch_size {
                            self.flush_retained();
                        }
                    }
                    // Capture side closed the channel — session is over.
                    None => break,
                },
                _ = ticker.tick() => self.flush_retained(),
                _ = token.cancelled() => break,
            }
        }

        // Drain: everything already delivered must reach the store.
        rx.close();
        while let Ok(record) = rx.try_recv() {
            self.push(record);
        }

        if let Err(e) = self.flush() {
            let lost = self.buffer.len();
            tracing::error!(error = %e, lost, "final flush failed, buffered records lost");
            return Err(e.with_context(format!("final flush ({lost} records lost)")));
        }

        let stats = RecorderStats {
            received: self.received,
            persisted: self.persisted,
            elapsed: started.elapsed(),
            file: self.session.path().to_path_buf(),
        };
        tracing::info!(
            received = stats.received,
            persisted = stats.persisted,
            elapsed_s = format!("{:.1}", stats.elapsed.as_secs_f64()),
            file = %stats.file.display(),
            "recording session finished"
        );
        Ok(stats)
    }

    fn push(&mut self, mut record: MessageRecord) {
        // Wall clock stepped backwards: clamp so file order stays
        // non-decreasing and arrival order is the tie-break.
        if record.timestamp < self.last_timestamp {
            record.timestamp = self.last_timestamp;
        } else {
            self.last_timestamp = record.timestamp;
        }

        self.buffer.push(record);
        self.received += 1;
        if self.received % 10_000 == 0 {
            tracing::info!(received = self.received, "capture progress");
        }
    }

    /// Flush, retaining the buffer on failure for the next trigger.
    fn flush_retained(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, pending = self.buffer.len(), "flush failed, batch retained");
        }
    }

    fn flush(&mut self) -> Result<(), CadenceError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let written = self.session.append(&self.buffer)?;
        self.persisted += written as u64;
        self.buffer.clear();
        tracing::debug!(flushed = written, "batch flushed");
        Ok(())
    }
}
