//! # Channel Configuration
//!
//! Limits and policy knobs for the channel keeper.

use serde::{Deserialize, Serialize};
use std::env;

use crate::domain::CHANNEL_ID_PREFIX;

/// Default maximum packet payload (1 MiB).
pub const DEFAULT_MAX_PACKET_DATA_LEN: usize = 1024 * 1024;

/// Default maximum version string length.
pub const DEFAULT_MAX_VERSION_LEN: usize = 512;

/// Channel keeper configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Maximum number of connection hops per channel.
    pub max_connection_hops: usize,

    /// Maximum packet payload in bytes.
    pub max_packet_data_len: usize,

    /// Maximum version string length in bytes.
    pub max_version_len: usize,

    /// Prefix for generated channel identifiers.
    pub channel_id_prefix: String,

    /// Allow upgrading ORDERED channels to UNORDERED.
    pub allow_ordered_to_unordered_upgrade: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_connection_hops: 1,
            max_packet_data_len: DEFAULT_MAX_PACKET_DATA_LEN,
            max_version_len: DEFAULT_MAX_VERSION_LEN,
            channel_id_prefix: CHANNEL_ID_PREFIX.to_string(),
            allow_ordered_to_unordered_upgrade: true,
        }
    }
}

impl ChannelConfig {
    /// Create a config for testing (small payload limit).
    pub fn for_testing() -> Self {
        Self {
            max_packet_data_len: 4096,
            ..Self::default()
        }
    }

    /// Defaults overridden from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `QC_IBC_MAX_PACKET_DATA_LEN`: Maximum packet payload (default: 1048576)
    /// - `QC_IBC_MAX_VERSION_LEN`: Maximum version length (default: 512)
    /// - `QC_IBC_MAX_CONNECTION_HOPS`: Maximum connection hops (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_packet_data_len: env::var("QC_IBC_MAX_PACKET_DATA_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_packet_data_len),

            max_version_len: env::var("QC_IBC_MAX_VERSION_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_version_len),

            max_connection_hops: env::var("QC_IBC_MAX_CONNECTION_HOPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connection_hops),

            ..defaults
        }
    }
}
