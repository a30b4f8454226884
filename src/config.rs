use std::env;
use thiserror::Error;

use crate::room::{Room, RoomError};
use crate::server::DEFAULT_ADDR;

pub const DEFAULT_ROOM_NAME: &str = "REx";
pub const DEFAULT_ROOM_SERVICE: &str = "_rex._tcp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be true or false, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error(transparent)]
    Room(#[from] RoomError),
}

/// Server settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RexConfig {
    pub addr: String,
    pub room: Room,
    pub discovery: bool,
}

impl Default for RexConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            room: Room::new(DEFAULT_ROOM_NAME, DEFAULT_ROOM_SERVICE),
            discovery: true,
        }
    }
}

impl RexConfig {
    /// Reads `REX_ADDR`, `REX_ROOM_NAME`, `REX_ROOM_SERVICE` and `REX_DISCOVERY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let addr = lookup("REX_ADDR").unwrap_or(defaults.addr);
        let name = lookup("REX_ROOM_NAME").unwrap_or(defaults.room.name);
        let service = lookup("REX_ROOM_SERVICE").unwrap_or(defaults.room.service);
        let discovery = match lookup("REX_DISCOVERY") {
            Some(value) => parse_bool("REX_DISCOVERY", &value)?,
            None => defaults.discovery,
        };

        let room = Room::new(name, service);
        room.validate()?;

        Ok(Self {
            addr,
            room,
            discovery,
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<RexConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RexConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, RexConfig::default());
        assert_eq!(config.addr, ":0");
        assert_eq!(config.room.service, "_rex._tcp");
        assert!(config.discovery);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REX_ADDR", "127.0.0.1:7000"),
            ("REX_ROOM_NAME", "Kitchen"),
            ("REX_ROOM_SERVICE", "_kitchen._tcp"),
            ("REX_DISCOVERY", "false"),
        ])
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:7000");
        assert_eq!(config.room, Room::new("Kitchen", "_kitchen._tcp"));
        assert!(!config.discovery);
    }

    #[rstest]
    #[case("TRUE", true)]
    #[case("on", true)]
    #[case("0", false)]
    #[case(" no ", false)]
    fn test_discovery_flag(#[case] value: &str, #[case] expected: bool) {
        let config = config_from(&[("REX_DISCOVERY", value)]).unwrap();
        assert_eq!(config.discovery, expected);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("REX_DISCOVERY", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            config_from(&[("REX_ROOM_SERVICE", "rex")]),
            Err(ConfigError::Room(_))
        ));
    }
}
