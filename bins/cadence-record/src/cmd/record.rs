use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cadence_core::{mqtt, CadenceError, Recorder, RecordingSession};

use super::config::RecordArgs;
use super::signals::spawn_signal_handler;

pub async fn run(args: &RecordArgs) -> Result<(), CadenceError> {
    let config = super::config::load_effective(args)?;

    let session = RecordingSession::create(
        &config.storage.directory,
        &config.storage.base_name,
        config.storage.fsync,
    )?;
    tracing::info!(
        file = %session.path().display(),
        batch_size = config.storage.batch_size,
        flush_interval_ms = config.storage.flush_interval_ms,
        "recording session started"
    );

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    // Bounded queue between the broker event loop and the recorder; a full
    // queue slows the transport down instead of dropping records.
    let (tx, rx) = mpsc::channel(config.storage.batch_size);

    let capture = tokio::spawn(mqtt::run_capture(
        config.mqtt.clone(),
        tx,
        token.clone(),
    ));

    let recorder = Recorder::new(
        session,
        config.storage.batch_size,
        Duration::from_millis(config.storage.flush_interval_ms),
    );
    let recorder_result = recorder.run(rx, token.clone()).await;

    // A capture failure (e.g. the broker refused the first connect) takes
    // precedence over the recorder's outcome.
    token.cancel();
    match capture.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(e) => tracing::warn!(error = %e, "capture task aborted"),
    }

    recorder_result.map(|_| ())
}
