use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

/// Runtime tunables. Every knob has a default; an absent config file means
/// all defaults. Unknown sections or keys are rejected so that a typo in an
/// option name fails loudly instead of silently running with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ring width m; identifiers live in [0, 2^m).
    pub ring_bits: u8,
    pub connection_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_factor: u32,
    pub max_concurrent_handlers: usize,
    pub handler_deadline: Duration,
    /// How long a successful ping vouches for a peer before it is probed
    /// again.
    pub liveness_window: Duration,
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub finger_refresh_interval: Duration,
    pub data_store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ring_bits: 10,
            connection_timeout: Duration::from_millis(1000),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            backoff_factor: 2,
            max_concurrent_handlers: 50,
            handler_deadline: Duration::from_millis(5000),
            liveness_window: Duration::from_millis(5000),
            stabilize_interval: Duration::from_millis(1000),
            fix_fingers_interval: Duration::from_millis(1000),
            finger_refresh_interval: Duration::from_millis(30_000),
            data_store_dir: PathBuf::from("data_stores"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),
    #[error("unrecognized config entry `{section}.{key}`")]
    UnknownKey { section: String, key: String },
    #[error("config entry `{section}.{key}` has invalid value `{value}`")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
    #[error("ring.bits must be between 1 and 63, got {0}")]
    RingBitsOutOfRange(u64),
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Config::default();

        for (section, properties) in ini.iter() {
            let section = section.unwrap_or("");
            for (key, value) in properties.iter() {
                config.apply(section, key, value)?;
            }
        }
        Ok(config)
    }

    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            section: section.to_owned(),
            key: key.to_owned(),
            value: value.to_owned(),
        };
        let parse = |value: &str| value.parse::<u64>().map_err(|_| invalid());

        match (section, key) {
            ("ring", "bits") => {
                let bits = parse(value)?;
                if !(1..=63).contains(&bits) {
                    return Err(ConfigError::RingBitsOutOfRange(bits));
                }
                self.ring_bits = bits as u8;
            }
            ("network", "connection_timeout_ms") => {
                self.connection_timeout = Duration::from_millis(parse(value)?)
            }
            ("network", "max_retries") => self.max_retries = parse(value)?.max(1) as u32,
            ("network", "retry_delay_ms") => {
                self.retry_delay = Duration::from_millis(parse(value)?)
            }
            ("network", "backoff_factor") => self.backoff_factor = parse(value)?.max(1) as u32,
            ("network", "max_concurrent_handlers") => {
                self.max_concurrent_handlers = parse(value)?.max(1) as usize
            }
            ("network", "handler_deadline_ms") => {
                self.handler_deadline = Duration::from_millis(parse(value)?)
            }
            ("network", "liveness_window_ms") => {
                self.liveness_window = Duration::from_millis(parse(value)?)
            }
            ("maintenance", "stabilize_interval_ms") => {
                self.stabilize_interval = Duration::from_millis(parse(value)?)
            }
            ("maintenance", "fix_fingers_interval_ms") => {
                self.fix_fingers_interval = Duration::from_millis(parse(value)?)
            }
            ("maintenance", "finger_refresh_interval_ms") => {
                self.finger_refresh_interval = Duration::from_millis(parse(value)?)
            }
            ("storage", "data_dir") => self.data_store_dir = PathBuf::from(value),
            _ => {
                return Err(ConfigError::UnknownKey {
                    section: section.to_owned(),
                    key: key.to_owned(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.ring_bits, 10);
        assert_eq!(config.connection_timeout, Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
        assert_eq!(config.backoff_factor, 2);
        assert_eq!(config.max_concurrent_handlers, 50);
        assert_eq!(config.handler_deadline, Duration::from_secs(5));
        assert_eq!(config.finger_refresh_interval, Duration::from_secs(30));
    }

    #[test]
    fn overrides_recognized_keys() {
        let file = write_config(
            "[ring]\nbits = 6\n\
             [network]\nmax_retries = 5\nretry_delay_ms = 50\n\
             [maintenance]\nstabilize_interval_ms = 250\n\
             [storage]\ndata_dir = /tmp/ring-data\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.ring_bits, 6);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.stabilize_interval, Duration::from_millis(250));
        assert_eq!(config.data_store_dir, PathBuf::from("/tmp/ring-data"));
        // untouched knobs keep their defaults
        assert_eq!(config.max_concurrent_handlers, 50);
    }

    #[test]
    fn rejects_unknown_keys() {
        let file = write_config("[network]\nconection_timeout_ms = 1000\n");
        match Config::load(file.path()) {
            Err(ConfigError::UnknownKey { section, key }) => {
                assert_eq!(section, "network");
                assert_eq!(key, "conection_timeout_ms");
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_ring_bits() {
        let file = write_config("[ring]\nbits = 64\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::RingBitsOutOfRange(64))
        ));
    }
}
