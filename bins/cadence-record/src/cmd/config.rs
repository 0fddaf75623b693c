use std::path::Path;

use clap::Args;

use cadence_core::{CadenceConfig, CadenceError};

#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Путь к config.toml
    #[arg(long, default_value = "config.toml", env = "CADENCE_CONFIG")]
    pub config: String,

    /// Каталог записей (перекрывает storage.directory)
    #[arg(long)]
    pub directory: Option<String>,

    /// Фильтр подписки (перекрывает mqtt.topic_filter), напр. "sensors/#"
    #[arg(long)]
    pub topic: Option<String>,
}

/// Итоговая конфигурация после мержа: config.toml < CLI.
pub fn load_effective(args: &RecordArgs) -> Result<CadenceConfig, CadenceError> {
    let mut config = if Path::new(&args.config).exists() {
        CadenceConfig::load(&args.config)?
    } else {
        CadenceConfig::default()
    };

    if let Some(ref directory) = args.directory {
        config.storage.directory = directory.into();
    }
    if let Some(ref topic) = args.topic {
        config.mqtt.topic_filter = topic.clone();
    }
    Ok(config)
}
