//! Container runtime: the engine plus the registered interface providers.
//!
//! Built once per process, before any actor exists; containers for every
//! actor of the type share it. Engine settings that determinism depends on
//! are fixed here: fuel metering on (gas), NaN canonicalization on,
//! threads off. The only cancellation primitive is gas exhaustion, so no
//! epoch/wall-clock interruption is configured.

use wasmtime::{Config, Engine};

use crate::config::ContainerConfig;
use crate::error::ContainerError;
use crate::interface::InterfaceRegistry;

/// Shared engine and host-interface registry for one container type.
pub struct ContainerRuntime {
    engine: Engine,
    config: ContainerConfig,
    registry: InterfaceRegistry,
}

impl ContainerRuntime {
    /// Build the runtime. The registry is sealed here; registration is a
    /// one-time setup step, not per-actor.
    pub fn new(
        config: ContainerConfig,
        registry: InterfaceRegistry,
    ) -> Result<Self, ContainerError> {
        let mut engine_config = Config::new();

        // Gas metering.
        engine_config.consume_fuel(true);

        // Deterministic float behavior across hosts.
        engine_config.cranelift_nan_canonicalization(true);

        // One logical thread of control per actor.
        engine_config.wasm_threads(false);

        engine_config.cranelift_opt_level(config.optimization_level);
        engine_config.debug_info(false);

        let engine = Engine::new(&engine_config)
            .map_err(|e| ContainerError::Engine(format!("engine creation failed: {e}")))?;

        tracing::info!(
            providers = ?registry.provider_names(),
            memory_limit = config.memory_limit,
            "container runtime ready"
        );

        Ok(Self {
            engine,
            config,
            registry,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRuntime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ContainerConfig;
    use crate::interface::InterfaceRegistry;
    use crate::runtime::ContainerRuntime;

    #[test]
    fn runtime_creation_with_empty_registry() {
        let runtime =
            ContainerRuntime::new(ContainerConfig::for_testing(), InterfaceRegistry::new())
                .unwrap();
        assert!(runtime.registry().is_empty());
    }
}
