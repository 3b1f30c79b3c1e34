use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (expected text or json)", other)),
        }
    }
}

/// Operator configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// server: https://10.0.0.1:6443
/// token: my-service-account-token
/// namespace: mongodb
/// ca-file: /etc/psmdb-operator/ca.crt
/// resync-interval-secs: 10
/// watchdog-interval-secs: 15
/// log-format: json
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfigFile {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, alias = "ca-file")]
    pub ca_file: Option<String>,
    #[serde(default, alias = "resync-interval-secs")]
    pub resync_interval_secs: Option<u64>,
    #[serde(default, alias = "watchdog-interval-secs")]
    pub watchdog_interval_secs: Option<u64>,
    #[serde(default, alias = "log-format")]
    pub log_format: Option<LogFormat>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: OperatorConfigFile =
            load_config_file("/nonexistent/psmdb-operator/config.yaml").unwrap();
        assert!(cfg.server.is_none());
        assert!(cfg.log_format.is_none());
    }

    #[test]
    fn parses_dashed_keys() {
        let yaml = "server: http://127.0.0.1:6443\nnamespace: db\nca-file: /tmp/ca.crt\nresync-interval-secs: 5\nlog-format: json\n";
        let cfg: OperatorConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.as_deref(), Some("http://127.0.0.1:6443"));
        assert_eq!(cfg.namespace.as_deref(), Some("db"));
        assert_eq!(cfg.ca_file.as_deref(), Some("/tmp/ca.crt"));
        assert_eq!(cfg.resync_interval_secs, Some(5));
        assert_eq!(cfg.watchdog_interval_secs, None);
        assert_eq!(cfg.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn log_format_from_flag() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
