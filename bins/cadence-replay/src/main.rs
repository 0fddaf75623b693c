mod cmd;

use clap::Parser;
use cmd::config::ReplayArgs;

#[derive(Parser)]
#[command(
    name = "cadence-replay",
    about = "Воспроизведение записанного MQTT трафика с исходными таймингами"
)]
struct Cli {
    #[command(flatten)]
    args: ReplayArgs,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = cmd::replay::run(&cli.args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
