//! Runtime configuration, loaded from a TOML file or constructed with
//! defaults that match the numbers named throughout spec.md (90 s grace,
//! 64/8 slot tables, 100-deep blocking queues, 5 s callback timeout, ...).

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nfs_port: u16,
    pub mount_port: u16,
    pub nlm_port: u16,
    pub smb_port: u16,

    /// Inclusive range of NFSv4 minor versions accepted by COMPOUND
    /// dispatch (spec.md §4.4).
    pub v4_min_minor_version: u32,
    pub v4_max_minor_version: u32,

    /// Fore/back channel slot table sizes (spec.md §3, §4.2).
    pub max_slots_fore: usize,
    pub max_slots_back: usize,
    /// 0 means unlimited, matching the source and spec.md §9's open
    /// question: exposed as configuration rather than a fixed cap.
    pub max_operations_per_compound: usize,
    /// Per-client session cap (spec.md §3).
    pub max_sessions_per_client: usize,

    /// Byte-range lock blocking queue depth per file (spec.md §4.1).
    pub max_queue_per_file: usize,

    pub lease_seconds: u64,
    pub grace_seconds: u64,
    pub session_reaper_tick_seconds: u64,
    pub connection_idle_seconds: u64,
    /// Total budget (dial + RPC) for oplock-break / grant callbacks
    /// (spec.md §4.1, §4.3, §5).
    pub callback_timeout_seconds: u64,

    /// Ordered preference for the SMB3 signing algorithm negotiated via
    /// the SIGNING_CAPABILITIES context (spec.md §4.6).
    pub signing_preference: Vec<SigningAlgorithm>,

    /// Whether OPEN may grant NFSv4 delegations. The coordinator must
    /// allow disabling this: Linux NFSv4 clients serve delegated writes
    /// locally and bypass server-side SUID clearing (spec.md §4.3).
    #[serde(default = "default_true")]
    pub delegations_enabled: bool,

    /// RPC auth flavors the back-channel callback client accepts.
    /// Deliberately permissive by default (spec.md §9 open question).
    pub callback_auth_allow: Vec<AuthFlavor>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    Gmac,
    Cmac,
    Hmac,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFlavor {
    AuthNone,
    AuthSys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nfs_port: 12049,
            mount_port: 12049,
            nlm_port: 12049,
            smb_port: 1445,
            v4_min_minor_version: 0,
            v4_max_minor_version: 1,
            max_slots_fore: 64,
            max_slots_back: 8,
            max_operations_per_compound: 0,
            max_sessions_per_client: 16,
            max_queue_per_file: 100,
            lease_seconds: 60,
            grace_seconds: 90,
            session_reaper_tick_seconds: 30,
            connection_idle_seconds: 300,
            callback_timeout_seconds: 5,
            signing_preference: vec![
                SigningAlgorithm::Gmac,
                SigningAlgorithm::Cmac,
                SigningAlgorithm::Hmac,
            ],
            delegations_enabled: true,
            callback_auth_allow: vec![AuthFlavor::AuthNone, AuthFlavor::AuthSys],
        }
    }
}

impl Config {
    /// Parses a TOML config file, falling back to [`Config::default`] for
    /// any field the file omits (via `#[serde(default)]`).
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_numbers() {
        let c = Config::default();
        assert_eq!(c.grace_seconds, 90);
        assert_eq!(c.max_slots_fore, 64);
        assert_eq!(c.max_slots_back, 8);
        assert_eq!(c.max_queue_per_file, 100);
        assert_eq!(c.callback_timeout_seconds, 5);
        assert_eq!(c.max_operations_per_compound, 0);
        assert!(c.delegations_enabled);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let c = Config::from_toml_str("grace_seconds = 5\n").unwrap();
        assert_eq!(c.grace_seconds, 5);
        assert_eq!(c.max_slots_fore, 64);
    }
}
