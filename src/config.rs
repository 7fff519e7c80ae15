//! Container configuration.
//!
//! Per-actor resource ceilings and metering costs. Engine-level settings
//! that determinism depends on (fuel metering, NaN canonicalization,
//! threads off) are fixed in [`crate::runtime`] and not configurable.

use wasmtime::OptLevel;

/// Default linear-memory ceiling per actor: 16 MiB.
pub const DEFAULT_MEMORY_LIMIT: u64 = 16 * 1024 * 1024;

/// Default table ceiling per actor, in entries.
pub const DEFAULT_TABLE_LIMIT: u64 = 4096;

/// Default gas debited for every host-call boundary crossing.
pub const DEFAULT_HOST_CALL_COST: u64 = 100;

/// Default gas budget for instantiation (segment initialization and the
/// start function run metered too).
pub const DEFAULT_CREATION_GAS: u64 = 1_000_000;

/// Configuration for a container runtime.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Maximum linear memory per actor, in bytes.
    pub memory_limit: u64,
    /// Maximum table size per actor, in entries.
    pub table_limit: u64,
    /// Gas debited per host-call crossing, on top of engine step costs.
    pub host_call_cost: u64,
    /// Gas budget available during instantiation.
    pub creation_gas: u64,
    /// Compiler optimization level.
    pub optimization_level: OptLevel,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            table_limit: DEFAULT_TABLE_LIMIT,
            host_call_cost: DEFAULT_HOST_CALL_COST,
            creation_gas: DEFAULT_CREATION_GAS,
            optimization_level: OptLevel::Speed,
        }
    }
}

impl ContainerConfig {
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_table_limit(mut self, entries: u64) -> Self {
        self.table_limit = entries;
        self
    }

    pub fn with_host_call_cost(mut self, gas: u64) -> Self {
        self.host_call_cost = gas;
        self
    }

    pub fn with_creation_gas(mut self, gas: u64) -> Self {
        self.creation_gas = gas;
        self
    }

    /// Tight limits and fast compilation for tests.
    pub fn for_testing() -> Self {
        Self {
            memory_limit: 1024 * 1024,
            table_limit: 256,
            host_call_cost: 10,
            creation_gas: 100_000,
            optimization_level: OptLevel::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{
        ContainerConfig, DEFAULT_HOST_CALL_COST, DEFAULT_MEMORY_LIMIT, DEFAULT_TABLE_LIMIT,
    };

    #[test]
    fn default_config() {
        let config = ContainerConfig::default();
        assert_eq!(config.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert_eq!(config.table_limit, DEFAULT_TABLE_LIMIT);
        assert_eq!(config.host_call_cost, DEFAULT_HOST_CALL_COST);
    }

    #[test]
    fn builder_overrides() {
        let config = ContainerConfig::default()
            .with_memory_limit(2 * 1024 * 1024)
            .with_host_call_cost(1)
            .with_creation_gas(50_000);
        assert_eq!(config.memory_limit, 2 * 1024 * 1024);
        assert_eq!(config.host_call_cost, 1);
        assert_eq!(config.creation_gas, 50_000);
    }

    #[test]
    fn testing_config_is_tighter_than_default() {
        let config = ContainerConfig::for_testing();
        assert!(config.memory_limit < DEFAULT_MEMORY_LIMIT);
        assert!(config.table_limit < DEFAULT_TABLE_LIMIT);
    }
}
