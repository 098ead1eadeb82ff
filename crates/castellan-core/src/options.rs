//! UCI option registry.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use crate::constants::MAX_THREADS;

#[derive(Debug, PartialEq, Eq)]
pub enum OptionError {
    Unknown(String),
    InvalidValue(String),
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionError::Unknown(name) => write!(f, "no such option: {name}"),
            OptionError::InvalidValue(value) => write!(f, "invalid option value: {value}"),
        }
    }
}

impl Error for OptionError {}

#[derive(Clone, Debug)]
enum OptionValue {
    Spin {
        value: i64,
        default: i64,
        min: i64,
        max: i64,
    },
    Check {
        value: bool,
        default: bool,
    },
}

/// The engine's configuration surface, keyed by UCI option name.
pub struct Options {
    map: BTreeMap<&'static str, OptionValue>,
}

impl Default for Options {
    fn default() -> Options {
        let mut map = BTreeMap::new();
        let default_threads = num_cpus::get().clamp(1, MAX_THREADS) as i64;
        map.insert(
            "Threads",
            OptionValue::Spin {
                value: default_threads,
                default: default_threads,
                min: 1,
                max: MAX_THREADS as i64,
            },
        );
        map.insert(
            "Min Split Depth",
            OptionValue::Spin {
                value: 4,
                default: 4,
                min: 0,
                max: 12,
            },
        );
        map.insert(
            "Max Threads per Split Point",
            OptionValue::Spin {
                value: 5,
                default: 5,
                min: 4,
                max: 8,
            },
        );
        map.insert(
            "Use Sleeping Threads",
            OptionValue::Check {
                value: true,
                default: true,
            },
        );
        map.insert(
            "Ponder",
            OptionValue::Check {
                value: false,
                default: false,
            },
        );
        Options { map }
    }
}

impl Options {
    /// Applies a `setoption` value. Spin values are clamped into range the
    /// way GUIs expect; unparsable input is an error.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        let Some(entry) = self.map.get_mut(name) else {
            return Err(OptionError::Unknown(name.to_string()));
        };
        match entry {
            OptionValue::Spin {
                value: current,
                min,
                max,
                ..
            } => {
                let parsed: i64 = value
                    .parse()
                    .map_err(|_| OptionError::InvalidValue(value.to_string()))?;
                *current = parsed.clamp(*min, *max);
            }
            OptionValue::Check { value: current, .. } => {
                *current = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(OptionError::InvalidValue(value.to_string())),
                };
            }
        }
        Ok(())
    }

    pub fn spin(&self, name: &str) -> i64 {
        match self.map.get(name) {
            Some(OptionValue::Spin { value, .. }) => *value,
            _ => panic!("unregistered spin option: {name}"),
        }
    }

    pub fn check(&self, name: &str) -> bool {
        match self.map.get(name) {
            Some(OptionValue::Check { value, .. }) => *value,
            _ => panic!("unregistered check option: {name}"),
        }
    }

    /// `option name …` description lines for the `uci` handshake.
    pub fn uci_lines(&self) -> Vec<String> {
        self.map
            .iter()
            .map(|(name, value)| match value {
                OptionValue::Spin {
                    default, min, max, ..
                } => {
                    format!("option name {name} type spin default {default} min {min} max {max}")
                }
                OptionValue::Check { default, .. } => {
                    format!("option name {name} type check default {default}")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_back() {
        let mut options = Options::default();
        options.set("Threads", "4").unwrap();
        assert_eq!(options.spin("Threads"), 4);

        options.set("Use Sleeping Threads", "false").unwrap();
        assert!(!options.check("Use Sleeping Threads"));
    }

    #[test]
    fn spins_clamp_into_range() {
        let mut options = Options::default();
        options.set("Threads", "9999").unwrap();
        assert_eq!(options.spin("Threads"), MAX_THREADS as i64);
        options.set("Threads", "0").unwrap();
        assert_eq!(options.spin("Threads"), 1);
        options.set("Max Threads per Split Point", "2").unwrap();
        assert_eq!(options.spin("Max Threads per Split Point"), 4);
    }

    #[test]
    fn errors_are_reported() {
        let mut options = Options::default();
        assert!(matches!(
            options.set("Hash", "64"),
            Err(OptionError::Unknown(_))
        ));
        assert!(matches!(
            options.set("Threads", "many"),
            Err(OptionError::InvalidValue(_))
        ));
        assert!(matches!(
            options.set("Ponder", "yes"),
            Err(OptionError::InvalidValue(_))
        ));
    }

    #[test]
    fn uci_lines_describe_every_option() {
        let options = Options::default();
        let lines = options.uci_lines();
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().any(|l| l.contains("name Threads type spin")));
        assert!(
            lines
                .iter()
                .any(|l| l.contains("name Use Sleeping Threads type check default true"))
        );
    }
}
