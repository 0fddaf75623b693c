use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CadenceError;

/// Root configuration — parsed from TOML.
///
/// `[mqtt]` is the subscribe side (recording), `[publish]` the publish side
/// (replay). Either section may be omitted; defaults point at a local broker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub mqtt: BrokerSettings,

    #[serde(default)]
    pub publish: BrokerSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Включить TLS для соединения с брокером.
    #[serde(default)]
    pub tls: bool,

    /// Проверять сертификат брокера (false = self-signed допустим).
    #[serde(default = "default_validate_certificate")]
    pub validate_certificate: bool,

    /// Пустая строка — client id по умолчанию для каждой утилиты.
    #[serde(default)]
    pub client_id: String,

    /// Фильтр подписки для записи. "#" — все topic'и.
    #[serde(default = "default_topic_filter")]
    pub topic_filter: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Каталог с файлами записей.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Базовое имя файла: `{base_name}_{N}.jsonl`.
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Сколько сообщений буферизуется до сброса на диск.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Максимальная задержка буферизации до принудительного сброса.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// fsync после каждого batch'а (медленнее, надёжнее при сбое).
    #[serde(default)]
    pub fsync: bool,

    /// Потолок паузы между сообщениями при воспроизведении. 0 = без потолка.
    #[serde(default)]
    pub max_replay_delay_secs: f64,
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    1883
}
fn default_validate_certificate() -> bool {
    true
}
fn default_topic_filter() -> String {
    "#".into()
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_directory() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_base_name() -> String {
    "mqtt_record".into()
}
fn default_batch_size() -> usize {
    1000
}
fn default_flush_interval_ms() -> u64 {
    5000
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            tls: false,
            validate_certificate: default_validate_certificate(),
            client_id: String::new(),
            topic_filter: default_topic_filter(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            base_name: default_base_name(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            fsync: false,
            max_replay_delay_secs: 0.0,
        }
    }
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CadenceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CadenceError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, CadenceError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| CadenceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CadenceError> {
        if self.storage.batch_size == 0 {
            return Err(CadenceError::Config(
                "storage.batch_size must be at least 1".into(),
            ));
        }
        if self.storage.base_name.is_empty() {
            return Err(CadenceError::Config(
                "storage.base_name must not be empty".into(),
            ));
        }
        if !self.storage.max_replay_delay_secs.is_finite()
            || self.storage.max_replay_delay_secs < 0.0
        {
            return Err(CadenceError::Config(
                "storage.max_replay_delay_secs must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = CadenceConfig::parse("").unwrap();
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_filter, "#");
        assert!(config.mqtt.validate_certificate);
        assert_eq!(config.storage.base_name, "mqtt_record");
        assert_eq!(config.storage.batch_size, 1000);
        assert_eq!(config.storage.flush_interval_ms, 5000);
        assert!(!config.storage.fsync);
        assert_eq!(config.storage.max_replay_delay_secs, 0.0);
    }

    #[test]
    fn parses_full_config() {
        let config = CadenceConfig::parse(
            r#"
            [mqtt]
            host = "broker.example.com"
            port = 8883
            username = "rec"
            password = "secret"
            tls = true
            validate_certificate = false
            topic_filter = "sensors/#"

            [publish]
            host = "other.example.com"

            [storage]
            directory = "/var/lib/cadence"
            base_name = "capture"
            batch_size = 50
            flush_interval_ms = 250
            fsync = true
            max_replay_delay_secs = 60.0
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "broker.example.com");
        assert_eq!(config.mqtt.port, 8883);
        assert!(config.mqtt.tls);
        assert!(!config.mqtt.validate_certificate);
        assert_eq!(config.mqtt.topic_filter, "sensors/#");
        assert_eq!(config.publish.host, "other.example.com");
        assert_eq!(config.publish.port, 1883);
        assert_eq!(config.storage.directory, PathBuf::from("/var/lib/cadence"));
        assert_eq!(config.storage.base_name, "capture");
        assert_eq!(config.storage.batch_size, 50);
        assert!(config.storage.fsync);
        assert_eq!(config.storage.max_replay_delay_secs, 60.0);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = CadenceConfig::parse("[storage]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
    }

    #[test]
    fn rejects_negative_replay_delay_cap() {
        let err = CadenceConfig::parse("[storage]\nmax_replay_delay_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CadenceConfig::load("/nonexistent/cadence.toml").unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
    }
}
