//! Chat configuration, read once at startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `MURMUR_ROLE` | `chat` |
//! | `MURMUR_SIGNAL_ENDPOINT` | required |
//! | `MURMUR_SIGNAL_BIND` | `0.0.0.0:7070` |
//! | `MURMUR_STAMP` | required to send |
//! | `MURMUR_OWN_OVERLAY` | required to listen |
//! | `MURMUR_REMOTE_OVERLAY` | required to send |
//! | `MURMUR_CHANNEL_ID` | required |
//! | `MURMUR_PROXIMITY_DEPTH` | required |
//! | `MURMUR_CACHE_PATH` | `mined-channels.json` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use murmur_cache::{parse_target, MiningInputs, DEFAULT_CACHE_FILE};
use murmur_signal::{UdpSignalConfig, MAX_DEPTH};
use thiserror::Error;

pub const ENV_ROLE: &str = "MURMUR_ROLE";
pub const ENV_ENDPOINT: &str = "MURMUR_SIGNAL_ENDPOINT";
pub const ENV_BIND: &str = "MURMUR_SIGNAL_BIND";
pub const ENV_STAMP: &str = "MURMUR_STAMP";
pub const ENV_OWN_OVERLAY: &str = "MURMUR_OWN_OVERLAY";
pub const ENV_REMOTE_OVERLAY: &str = "MURMUR_REMOTE_OVERLAY";
pub const ENV_CHANNEL_ID: &str = "MURMUR_CHANNEL_ID";
pub const ENV_PROXIMITY_DEPTH: &str = "MURMUR_PROXIMITY_DEPTH";
pub const ENV_CACHE_PATH: &str = "MURMUR_CACHE_PATH";

const DEFAULT_BIND: &str = "0.0.0.0:7070";

/// Configuration errors. All are fatal before any channel is resolved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which channels a session brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Listen on the own channel and send on the remote one.
    #[default]
    Chat,
    /// Listen only.
    Listen,
    /// Send only.
    Send,
}

impl Role {
    pub fn listens(self) -> bool {
        matches!(self, Role::Chat | Role::Listen)
    }

    pub fn sends(self) -> bool {
        matches!(self, Role::Chat | Role::Send)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Role::Chat),
            "listen" => Ok(Role::Listen),
            "send" => Ok(Role::Send),
            other => Err(format!("unknown role {other:?} (expected chat, listen or send)")),
        }
    }
}

/// The channels a session must resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    /// Inbound channel, near our own overlay.
    pub own: Option<MiningInputs>,
    /// Outbound channel, near the remote overlay.
    pub remote: Option<MiningInputs>,
}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub role: Role,
    /// Where writes are sent.
    pub endpoint: SocketAddr,
    /// Local socket address.
    pub bind: SocketAddr,
    /// Postage stamp for writes.
    pub stamp: Option<String>,
    pub own_overlay: Option<String>,
    pub remote_overlay: Option<String>,
    /// Channel id, also the consensus id.
    pub channel_id: String,
    pub proximity_depth: u8,
    pub cache_path: PathBuf,
}

impl ChatConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let role = match get(ENV_ROLE) {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: ENV_ROLE,
                value,
                reason,
            })?,
            None => Role::default(),
        };

        let endpoint = parse_addr(ENV_ENDPOINT, require(ENV_ENDPOINT)?)?;
        let bind = parse_addr(ENV_BIND, get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string()))?;
        let channel_id = require(ENV_CHANNEL_ID)?;

        let depth = require(ENV_PROXIMITY_DEPTH)?;
        let proximity_depth = depth.parse::<u8>().map_err(|e| ConfigError::Invalid {
            key: ENV_PROXIMITY_DEPTH,
            value: depth.clone(),
            reason: e.to_string(),
        })?;
        if proximity_depth > MAX_DEPTH {
            return Err(ConfigError::Invalid {
                key: ENV_PROXIMITY_DEPTH,
                value: depth,
                reason: format!("must be at most {MAX_DEPTH}"),
            });
        }

        let own_overlay = if role.listens() {
            Some(overlay(ENV_OWN_OVERLAY, require(ENV_OWN_OVERLAY)?)?)
        } else {
            None
        };
        let remote_overlay = if role.sends() {
            Some(overlay(ENV_REMOTE_OVERLAY, require(ENV_REMOTE_OVERLAY)?)?)
        } else {
            None
        };
        let stamp = if role.sends() {
            let stamp = require(ENV_STAMP)?;
            hex::decode(&stamp).map_err(|e| ConfigError::Invalid {
                key: ENV_STAMP,
                value: stamp.clone(),
                reason: e.to_string(),
            })?;
            Some(stamp)
        } else {
            None
        };

        let cache_path = get(ENV_CACHE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));

        Ok(Self {
            role,
            endpoint,
            bind,
            stamp,
            own_overlay,
            remote_overlay,
            channel_id,
            proximity_depth,
            cache_path,
        })
    }

    /// Mining inputs for the channels this role needs.
    pub fn plan(&self) -> SessionPlan {
        let inputs = |overlay: &String| {
            MiningInputs::new(self.channel_id.clone(), self.proximity_depth, overlay.clone())
        };
        SessionPlan {
            own: self.own_overlay.as_ref().map(inputs),
            remote: self.remote_overlay.as_ref().map(inputs),
        }
    }

    /// Settings for the UDP signal.
    pub fn signal_config(&self) -> UdpSignalConfig {
        let config = UdpSignalConfig::new(self.bind, self.endpoint);
        match &self.stamp {
            Some(stamp) => config.with_stamp(stamp.clone()),
            None => config,
        }
    }
}

fn parse_addr(key: &'static str, value: String) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn overlay(key: &'static str, value: String) -> Result<String, ConfigError> {
    match parse_target(&value) {
        Ok(_) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const OWN: &str = "7570000000000000000000000000000000000000000000000000000000000000";
    const REMOTE: &str = "2b40000000000000000000000000000000000000000000000000000000000000";
    const STAMP: &str = "17caba8ae704c356f50cb4f3e14568d3462423448334bd7df032298d88d83bb9";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full() -> HashMap<String, String> {
        env(&[
            (ENV_ENDPOINT, "127.0.0.1:7071"),
            (ENV_STAMP, STAMP),
            (ENV_OWN_OVERLAY, OWN),
            (ENV_REMOTE_OVERLAY, REMOTE),
            (ENV_CHANNEL_ID, "comments-v1"),
            (ENV_PROXIMITY_DEPTH, "16"),
        ])
    }

    fn load(vars: &HashMap<String, String>) -> Result<ChatConfig, ConfigError> {
        ChatConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn loads_chat_config_with_defaults() {
        let config = load(&full()).unwrap();
        assert_eq!(config.role, Role::Chat);
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.cache_path, PathBuf::from(DEFAULT_CACHE_FILE));
        assert_eq!(config.proximity_depth, 16);

        let plan = config.plan();
        assert_eq!(plan.own, Some(MiningInputs::new("comments-v1", 16, OWN)));
        assert_eq!(plan.remote, Some(MiningInputs::new("comments-v1", 16, REMOTE)));
    }

    #[test]
    fn missing_channel_id_fails_fast() {
        let mut vars = full();
        vars.remove(ENV_CHANNEL_ID);
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing(ENV_CHANNEL_ID));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut vars = full();
        vars.insert(ENV_ENDPOINT.into(), "   ".into());
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing(ENV_ENDPOINT));
    }

    #[test]
    fn invalid_depth_is_rejected() {
        let mut vars = full();
        vars.insert(ENV_PROXIMITY_DEPTH.into(), "deep".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: ENV_PROXIMITY_DEPTH, .. })
        ));
    }

    #[test]
    fn depth_above_miner_limit_is_rejected() {
        let mut vars = full();
        vars.insert(ENV_PROXIMITY_DEPTH.into(), "30".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: ENV_PROXIMITY_DEPTH, .. })
        ));

        vars.insert(ENV_PROXIMITY_DEPTH.into(), MAX_DEPTH.to_string());
        assert_eq!(load(&vars).unwrap().proximity_depth, MAX_DEPTH);
    }

    #[test]
    fn short_overlay_is_rejected() {
        let mut vars = full();
        vars.insert(ENV_OWN_OVERLAY.into(), "7570".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: ENV_OWN_OVERLAY, .. })
        ));
    }

    #[test]
    fn listen_role_needs_no_stamp_or_remote() {
        let vars = env(&[
            (ENV_ROLE, "LISTEN"),
            (ENV_ENDPOINT, "127.0.0.1:7071"),
            (ENV_OWN_OVERLAY, OWN),
            (ENV_CHANNEL_ID, "comments-v1"),
            (ENV_PROXIMITY_DEPTH, "16"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.role, Role::Listen);
        assert!(config.stamp.is_none());
        assert!(config.plan().remote.is_none());
        assert!(config.signal_config().stamp.is_none());
    }

    #[test]
    fn send_role_requires_stamp() {
        let mut vars = full();
        vars.insert(ENV_ROLE.into(), "send".into());
        vars.remove(ENV_STAMP);
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing(ENV_STAMP));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let mut vars = full();
        vars.insert(ENV_ROLE.into(), "relay".into());
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { key: ENV_ROLE, .. })));
    }

    #[test]
    fn stamp_flows_into_signal_config() {
        let config = load(&full()).unwrap();
        let signal = config.signal_config();
        assert_eq!(signal.stamp.as_deref(), Some(STAMP));
        assert_eq!(signal.endpoint, "127.0.0.1:7071".parse::<SocketAddr>().unwrap());
    }
}
