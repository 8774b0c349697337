//! Engine configuration options.

use crate::config::ProtocolConfig;
use crate::types::Timestamp;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Protocol parameters the engine starts with.
    pub protocol: ProtocolConfig,
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Clock value at construction.
    pub start_time: Timestamp,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            max_events: 100_000,
            start_time: Timestamp::from_secs(0),
        }
    }
}

impl EngineConfig {
    pub fn with_protocol(protocol: ProtocolConfig) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }
}
