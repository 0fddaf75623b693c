use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cadence_core::mqtt::MqttPublisher;
use cadence_core::{
    list_recordings, open_recording, replay, CadenceConfig, CadenceError, RecordingSelector,
};

use super::config::ReplayArgs;
use super::signals::spawn_signal_handler;

pub async fn run(args: &ReplayArgs) -> Result<(), CadenceError> {
    let config = super::config::load_effective(args)?;

    if args.list {
        return list(&config);
    }

    let selector = match args.file {
        Some(ref name) => RecordingSelector::Named(name.clone()),
        None => RecordingSelector::Latest,
    };
    let cursor = open_recording(
        &config.storage.directory,
        &config.storage.base_name,
        selector,
    )?;
    tracing::info!(file = %cursor.path().display(), "replaying recording");

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let mut publisher = MqttPublisher::connect(&config.publish).await?;

    let max_delay = (config.storage.max_replay_delay_secs > 0.0)
        .then(|| Duration::from_secs_f64(config.storage.max_replay_delay_secs));
    let result = replay(cursor, &mut publisher, max_delay, &token).await;

    publisher.disconnect().await;
    result.map(|_| ())
}

fn list(config: &CadenceConfig) -> Result<(), CadenceError> {
    let recordings = list_recordings(&config.storage.directory, &config.storage.base_name)?;
    if recordings.is_empty() {
        println!(
            "No recordings in {}",
            config.storage.directory.display()
        );
        return Ok(());
    }

    println!("Available recordings:");
    for summary in recordings {
        let span = match (summary.first_timestamp, summary.last_timestamp) {
            (Some(first), Some(last)) => format!("{:.1}s", last - first),
            _ => "-".into(),
        };
        println!(
            "  {}  {} records, {} bytes, span {}",
            summary.name, summary.records, summary.bytes, span
        );
    }
    Ok(())
}
