mod cmd;

use clap::Parser;
use cmd::config::RecordArgs;

#[derive(Parser)]
#[command(name = "cadence-record", about = "Запись MQTT трафика в файл с таймингами")]
struct Cli {
    #[command(flatten)]
    args: RecordArgs,
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

    if let Err(e) = cmd::record::run(&cli.args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
