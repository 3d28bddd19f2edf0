use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be positive")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads every `RESERVO_*` variable through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_connections = parsed(&lookup, "RESERVO_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(ConfigError::Zero("RESERVO_MAX_CONNECTIONS"));
        }
        let interval_secs: u64 = parsed(&lookup, "RESERVO_COMPACT_INTERVAL_SECS")?
            .unwrap_or(defaults.compact_interval.as_secs());
        if interval_secs == 0 {
            return Err(ConfigError::Zero("RESERVO_COMPACT_INTERVAL_SECS"));
        }

        Ok(Self {
            bind: lookup("RESERVO_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "RESERVO_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("RESERVO_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections,
            compact_threshold: parsed(&lookup, "RESERVO_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            compact_interval: Duration::from_secs(interval_secs),
            metrics_port: parsed(&lookup, "RESERVO_METRICS_PORT")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservo.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(env(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
        assert_eq!(config.wal_path(), PathBuf::from("./data/reservo.wal"));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(env(&[
            ("RESERVO_BIND", "127.0.0.1"),
            ("RESERVO_PORT", "6000"),
            ("RESERVO_DATA_DIR", "/var/lib/reservo"),
            ("RESERVO_MAX_CONNECTIONS", "8"),
            ("RESERVO_COMPACT_THRESHOLD", "50"),
            ("RESERVO_COMPACT_INTERVAL_SECS", "5"),
            ("RESERVO_METRICS_PORT", " 9100 "),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/reservo/reservo.wal"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.compact_interval, Duration::from_secs(5));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_lookup(env(&[("RESERVO_PORT", "fifty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "RESERVO_PORT",
                value: "fifty".into()
            }
        );
        assert!(Config::from_lookup(env(&[("RESERVO_METRICS_PORT", "-1")])).is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        assert_eq!(
            Config::from_lookup(env(&[("RESERVO_MAX_CONNECTIONS", "0")])),
            Err(ConfigError::Zero("RESERVO_MAX_CONNECTIONS"))
        );
        assert_eq!(
            Config::from_lookup(env(&[("RESERVO_COMPACT_INTERVAL_SECS", "0")])),
            Err(ConfigError::Zero("RESERVO_COMPACT_INTERVAL_SECS"))
        );
    }
}
