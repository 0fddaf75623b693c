use std::path::Path;

use clap::Args;

use cadence_core::{CadenceConfig, CadenceError};

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Путь к config.toml
    #[arg(long, default_value = "config.toml", env = "CADENCE_CONFIG")]
    pub config: String,

    /// Файл записи (имя или путь). Без указания — последняя запись
    #[arg(long, short = 'f')]
    pub file: Option<String>,

    /// Показать доступные записи и выйти
    #[arg(long, short = 'l')]
    pub list: bool,

    /// Каталог записей (перекрывает storage.directory)
    #[arg(long)]
    pub directory: Option<String>,
}

/// Итоговая конфигурация после мержа: config.toml < CLI.
pub fn load_effective(args: &ReplayArgs) -> Result<CadenceConfig, CadenceError> {
    let mut config = if Path::new(&args.config).exists() {
        CadenceConfig::load(&args.config)?
    } else {
        CadenceConfig::default()
    };

    if let Some(ref directory) = args.directory {
        config.storage.directory = directory.into();
    }
    Ok(config)
}
