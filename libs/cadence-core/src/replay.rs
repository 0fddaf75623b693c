use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::CadenceError;
use crate::record::MessageRecord;
use crate::store::RecordingCursor;

/// Outbound publish seam — the scheduler drives any broker client (or a
/// test double) through this single capability.
pub trait MessageSink {
    fn publish(
        &mut self,
        record: &MessageRecord,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;
}

/// Final statistics for one replay run.
#[derive(Debug, Clone)]
pub struct ReplayStats {
    pub replayed: u64,
    /// Malformed lines skipped with a warning.
    pub malformed: u64,
    pub elapsed: Duration,
    /// false when the run was cancelled mid-stream.
    pub completed: bool,
}

/// Replay a recording through `sink`, reproducing the original cadence.
///
/// Strictly sequential: read → delay → publish, one record at a time. The
/// first record goes out immediately; each subsequent record waits
/// `timestamp[i] - timestamp[i-1]` (clamped at zero — never out of order,
/// never "in the past"; optionally capped by `max_delay`). The sleep is the
/// only suspension point and aborts as soon as `token` fires.
///
/// Malformed lines are skipped with a warning. A failed publish aborts the
/// run: silently skipping one would break the cadence being reproduced.
pub async fn replay<S: MessageSink>(
    cursor: RecordingCursor,
    sink: &mut S,
    max_delay: Option<Duration>,
    token: &CancellationToken,
) -> Result<ReplayStats, CadenceError> {
    let started = Instant::now();
    let mut replayed = 0u64;
    let mut malformed = 0u64;
    let mut prev_timestamp: Option<f64> = None;
    let mut completed = true;

    'records: for item in cursor {
        let record = match item {
            Ok(record) => record,
            Err(CadenceError::MalformedRecord { line, detail }) => {
                tracing::warn!(line, %detail, "skipping malformed record");
                malformed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Some(prev) = prev_timestamp {
            let gap = record.timestamp - prev;
            let mut delay = if gap > 0.0 {
                Duration::try_from_secs_f64(gap).unwrap_or(Duration::MAX)
            } else {
                Duration::ZERO
            };
            if let Some(cap) = max_delay {
                delay = delay.min(cap);
            }
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => {
                        completed = false;
                        break 'records;
                    }
                }
            }
        }
        if token.is_cancelled() {
            completed = false;
            break;
        }

        if let Err(e) = sink.publish(&record).await {
            tracing::error!(error = %e, topic = %record.topic, replayed, "publish failed, aborting replay");
            return Err(e);
        }
        replayed += 1;
        if replayed % 1_000 == 0 {
            tracing::info!(replayed, "replay progress");
        }
        prev_timestamp = Some(record.timestamp);
    }

    let stats = ReplayStats {
        replayed,
        malformed,
        elapsed: started.elapsed(),
        completed,
    };
    tracing::info!(
        replayed = stats.replayed,
        malformed = stats.malformed,
        elapsed_s = format!("{:.1}", stats.elapsed.as_secs_f64()),
        completed = stats.completed,
        "replay finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_recording, RecordingSelector, RecordingSession};
    use tempfile::TempDir;

    struct CollectingSink {
        published: Vec<(tokio::time::Instant, MessageRecord)>,
        fail_after: Option<usize>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                published: Vec::new(),
                fail_after: None,
            }
        }
    }

    impl MessageSink for CollectingSink {
        async fn publish(&mut self, record: &MessageRecord) -> Result<(), CadenceError> {
            if let Some(limit) = self.fail_after {
                if self.published.len() >= limit {
                    return Err(CadenceError::Publish("connection reset".into()));
                }
            }
            self.published.push((tokio::time::Instant::now(), record.clone()));
            Ok(())
        }
    }

    fn record(topic: &str, payload: &str, timestamp: f64) -> MessageRecord {
        MessageRecord {
            topic: topic.into(),
            payload: payload.into(),
            timestamp,
            qos: None,
            retain: None,
        }
    }

    fn write_recording(dir: &TempDir, records: &[MessageRecord]) -> RecordingCursor {
        let mut session = RecordingSession::create(dir.path(), "rec", false).unwrap();
        session.append(records).unwrap();
        open_recording(dir.path(), "rec", RecordingSelector::Latest).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reproduces_order_and_gaps() {
        let dir = TempDir::new().unwrap();
        let cursor = write_recording(
            &dir,
            &[
                record("a/b", "1", 100.0),
                record("a/b", "2", 100.5),
                record("c/d", "3", 101.0),
            ],
        );

        let start = tokio::time::Instant::now();
        let mut sink = CollectingSink::new();
        let stats = replay(cursor, &mut sink, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.replayed, 3);
        assert_eq!(stats.malformed, 0);
        assert!(stats.completed);

        let payloads: Vec<_> = sink.published.iter().map(|(_, r)| r.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);

        // First record publishes immediately, the rest at the original gaps
        // (virtual clock, so the spacing is exact).
        assert_eq!(sink.published[0].0, start);
        assert_eq!(sink.published[1].0 - sink.published[0].0, Duration::from_millis(500));
        assert_eq!(sink.published[2].0 - sink.published[1].0, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn negative_gaps_clamp_to_zero() {
        let dir = TempDir::new().unwrap();
        // Out-of-order timestamps written directly, bypassing the recorder.
        let cursor = write_recording(
            &dir,
            &[record("t", "1", 100.0), record("t", "2", 50.0), record("t", "3", 50.2)],
        );

        let mut sink = CollectingSink::new();
        let stats = replay(cursor, &mut sink, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.replayed, 3);
        assert_eq!(sink.published[1].0 - sink.published[0].0, Duration::ZERO);
        assert_eq!(
            sink.published[2].0 - sink.published[1].0,
            Duration::from_millis(200)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_delay_caps_long_gaps() {
        let dir = TempDir::new().unwrap();
        let cursor = write_recording(&dir, &[record("t", "1", 0.0), record("t", "2", 300.0)]);

        let mut sink = CollectingSink::new();
        let stats = replay(
            cursor,
            &mut sink,
            Some(Duration::from_secs(60)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.replayed, 2);
        assert_eq!(sink.published[1].0 - sink.published[0].0, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn skips_malformed_lines_and_keeps_going() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rec_1.jsonl"),
            concat!(
                "{\"topic\":\"a\",\"payload\":\"1\",\"timestamp\":1.0}\n",
                "definitely not json\n",
                "{\"topic\":\"a\",\"payload\":\"2\",\"timestamp\":1.0}\n",
            ),
        )
        .unwrap();
        let cursor = open_recording(dir.path(), "rec", RecordingSelector::Latest).unwrap();

        let mut sink = CollectingSink::new();
        let stats = replay(cursor, &mut sink, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.replayed, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(sink.published.len(), 2);
    }

    #[tokio::test]
    async fn cancellation_aborts_pending_sleep() {
        let dir = TempDir::new().unwrap();
        let cursor = write_recording(&dir, &[record("t", "1", 0.0), record("t", "2", 3600.0)]);

        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut sink = CollectingSink::new();
            let stats = replay(cursor, &mut sink, None, &run_token).await.unwrap();
            (stats, sink.published.len())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let started = Instant::now();
        let (stats, published) = handle.await.unwrap();
        // The hour-long gap was abandoned immediately.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(published, 1);
        assert_eq!(stats.replayed, 1);
        assert!(!stats.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let cursor = write_recording(
            &dir,
            &[record("t", "1", 0.0), record("t", "2", 0.1), record("t", "3", 0.2)],
        );

        let mut sink = CollectingSink::new();
        sink.fail_after = Some(1);
        let err = replay(cursor, &mut sink, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CadenceError::Publish(_)));
        assert_eq!(sink.published.len(), 1);
    }
}
