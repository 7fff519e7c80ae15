//! Host interface registration and binding.
//!
//! The embedder registers named [`InterfaceProvider`]s (for example an
//! `"env"` capability and a `"test"` capability) once, before any actor
//! exists. At instantiation the registry folds every provider function
//! into the import namespace the module links against, as
//! `<provider>.<function>`. Merging is deterministic and collisions are a
//! registration-time [`ConfigurationError`], never silently shadowed.
//!
//! Provider functions receive raw typed arguments and a [`HostCtx`] over
//! the running actor, through which they can read and write linear memory,
//! inspect and debit gas, and make synchronous re-entrant calls. A
//! provider function that returns [`HostOutcome::Deferred`] does not
//! produce a value for the module; it parks a deferred operation on the
//! invocation's queue and the declared results are zeroed until a callback
//! re-entry delivers the real ones.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use wasmtime::{Caller, Engine, Extern, FuncType, Linker, Val, ValType};

use crate::error::{
    BoundsError, ConfigurationError, ContainerError, HostTrap, TrapReason, TrapRecord,
};
use crate::gas;
use crate::module::ActorState;
use crate::ops::DeferredOp;
use crate::value::{self, WasmValue};

/// Handler for one host function.
pub type HostHandler =
    dyn Fn(&mut HostCtx<'_, '_>, &[Val], &mut [Val]) -> Result<HostOutcome, TrapRecord>
        + Send
        + Sync;

/// What a host call produced.
pub enum HostOutcome {
    /// Results are written; control returns to the module synchronously.
    Done,
    /// Park the invocation on the operations queue. Declared results are
    /// zeroed; the real result arrives through a callback re-entry.
    Deferred(DeferredOp),
}

/// One host function a provider exposes to modules.
pub struct HostFuncDecl {
    name: String,
    params: Vec<ValType>,
    results: Vec<ValType>,
    handler: Arc<HostHandler>,
}

impl HostFuncDecl {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ValType>,
        results: Vec<ValType>,
        handler: impl Fn(&mut HostCtx<'_, '_>, &[Val], &mut [Val]) -> Result<HostOutcome, TrapRecord>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            results,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named capability object contributing host functions to the import
/// namespace.
///
/// Specialized behavior is expressed by supplying additional providers,
/// not by subclassing the container.
pub trait InterfaceProvider: Send + Sync {
    /// Import namespace this provider's functions are linked under.
    fn name(&self) -> &str;

    /// Host functions exposed to the module.
    fn functions(&self) -> Vec<HostFuncDecl>;

    /// Observes the raw bytecode before an actor of this container type is
    /// instantiated.
    fn initialize(&self, _bytecode: &[u8]) {}
}

/// Deterministic, collision-checked collection of interface providers.
#[derive(Default)]
pub struct InterfaceRegistry {
    providers: BTreeMap<String, Arc<dyn InterfaceProvider>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A duplicate provider name, or a duplicate
    /// function name within the provider, is a configuration error; the
    /// registry is left unchanged when one is raised.
    pub fn register(
        &mut self,
        provider: Arc<dyn InterfaceProvider>,
    ) -> Result<(), ConfigurationError> {
        let name = provider.name().to_string();
        if name.is_empty() {
            return Err(ConfigurationError::EmptyProviderName);
        }
        if self.providers.contains_key(&name) {
            return Err(ConfigurationError::DuplicateProvider(name));
        }
        let mut seen = HashSet::new();
        for decl in provider.functions() {
            if !seen.insert(decl.name.clone()) {
                return Err(ConfigurationError::DuplicateFunction {
                    provider: name,
                    function: decl.name,
                });
            }
        }
        tracing::debug!(provider = %name, functions = seen.len(), "interface provider registered");
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Registered provider names, in deterministic (sorted) order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Run every provider's creation hook against the raw bytecode.
    pub(crate) fn notify_instantiation(&self, bytecode: &[u8]) {
        for provider in self.providers.values() {
            provider.initialize(bytecode);
        }
    }

    /// Fold all provider functions into a linker for one instantiation.
    pub(crate) fn bind(
        &self,
        engine: &Engine,
        host_call_cost: u64,
    ) -> Result<Linker<ActorState>, ContainerError> {
        let mut linker = Linker::new(engine);
        for (provider_name, provider) in &self.providers {
            for decl in provider.functions() {
                let ty = FuncType::new(engine, decl.params.clone(), decl.results.clone());
                let handler = Arc::clone(&decl.handler);
                let result_types = decl.results.clone();
                let shim = move |mut caller: Caller<'_, ActorState>,
                                 params: &[Val],
                                 results: &mut [Val]|
                      -> anyhow::Result<()> {
                    // Host-call crossing debit happens before the handler
                    // runs; an exhausted budget means the handler's side
                    // effects are never committed.
                    if let Err(trap) = gas::debit(&mut caller, host_call_cost) {
                        return Err(HostTrap(trap).into());
                    }
                    let mut ctx = HostCtx {
                        caller: &mut caller,
                    };
                    match handler(&mut ctx, params, results) {
                        Ok(HostOutcome::Done) => Ok(()),
                        Ok(HostOutcome::Deferred(op)) => {
                            for (slot, ty) in results.iter_mut().zip(result_types.iter()) {
                                *slot = value::zero_val(ty).ok_or_else(|| {
                                    HostTrap(TrapRecord::new(
                                        TrapReason::Host,
                                        "deferred host call with unsupported result type",
                                    ))
                                })?;
                            }
                            caller.data_mut().ops.push(op);
                            Ok(())
                        }
                        Err(trap) => Err(HostTrap(trap).into()),
                    }
                };
                linker
                    .func_new(provider_name, &decl.name, ty, shim)
                    .map_err(|e| ContainerError::Link(e.to_string()))?;
            }
        }
        Ok(linker)
    }
}

impl std::fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}

/// The container as seen from inside a host call.
pub struct HostCtx<'a, 'b> {
    caller: &'a mut Caller<'b, ActorState>,
}

impl HostCtx<'_, '_> {
    /// Read a byte range from the module's exported linear memory.
    pub fn read_memory(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, TrapRecord> {
        let memory = self.exported_memory()?;
        let size = memory.data_size(&mut *self.caller) as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(TrapRecord::new(
                TrapReason::MemoryOutOfBounds,
                BoundsError::Memory { offset, len, size }.to_string(),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        memory
            .read(&mut *self.caller, offset as usize, &mut buf)
            .map_err(|e| TrapRecord::new(TrapReason::MemoryOutOfBounds, e.to_string()))?;
        Ok(buf)
    }

    /// Write bytes into the module's exported linear memory.
    pub fn write_memory(&mut self, offset: u64, bytes: &[u8]) -> Result<(), TrapRecord> {
        let memory = self.exported_memory()?;
        let size = memory.data_size(&mut *self.caller) as u64;
        let len = bytes.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(TrapRecord::new(
                TrapReason::MemoryOutOfBounds,
                BoundsError::Memory { offset, len, size }.to_string(),
            ));
        }
        memory
            .write(&mut *self.caller, offset as usize, bytes)
            .map_err(|e| TrapRecord::new(TrapReason::MemoryOutOfBounds, e.to_string()))
    }

    /// Gas remaining in the current invocation's budget.
    pub fn gas_remaining(&mut self) -> Result<u64, TrapRecord> {
        gas::remaining(&mut *self.caller)
    }

    /// Debit additional gas beyond the crossing cost, for providers whose
    /// operations have input-dependent cost.
    pub fn debit_gas(&mut self, cost: u64) -> Result<(), TrapRecord> {
        gas::debit(&mut *self.caller, cost)
    }

    /// Synchronously call another export of the same module from inside a
    /// host call. Shares the invocation's budget.
    pub fn call_export(
        &mut self,
        name: &str,
        args: &[WasmValue],
    ) -> Result<Vec<WasmValue>, TrapRecord> {
        let func = self
            .caller
            .get_export(name)
            .and_then(Extern::into_func)
            .ok_or_else(|| {
                TrapRecord::new(
                    TrapReason::BadFuncRef,
                    format!("module exports no function {name:?}"),
                )
            })?;
        let ty = func.ty(&mut *self.caller);
        let params: Vec<ValType> = ty.params().collect();
        if params.len() != args.len() {
            return Err(TrapRecord::new(
                TrapReason::InvalidInvocation,
                format!("{name:?} expects {} arguments, got {}", params.len(), args.len()),
            ));
        }
        let mut lowered = Vec::with_capacity(args.len());
        for (arg, ty) in args.iter().zip(&params) {
            if !arg.matches(ty) {
                return Err(TrapRecord::new(
                    TrapReason::InvalidInvocation,
                    format!("argument type mismatch calling {name:?}"),
                ));
            }
            let val = match arg {
                WasmValue::I32(v) => Val::I32(*v),
                WasmValue::I64(v) => Val::I64(*v),
                WasmValue::F32(bits) => Val::F32(*bits),
                WasmValue::F64(bits) => Val::F64(*bits),
                WasmValue::Ref(_) => {
                    return Err(TrapRecord::new(
                        TrapReason::InvalidInvocation,
                        "function-reference arguments are not supported in re-entrant calls",
                    ));
                }
            };
            lowered.push(val);
        }
        let mut results: Vec<Val> = ty
            .results()
            .map(|t| value::zero_val(&t))
            .collect::<Option<_>>()
            .ok_or_else(|| {
                TrapRecord::new(TrapReason::InvalidInvocation, "unsupported result type")
            })?;
        func.call(&mut *self.caller, &lowered, &mut results)
            .map_err(|e| TrapRecord::from_runtime(&e))?;
        results
            .iter()
            .map(|v| {
                WasmValue::from_val(v).ok_or_else(|| {
                    TrapRecord::new(TrapReason::InvalidInvocation, "unsupported result type")
                })
            })
            .collect()
    }

    fn exported_memory(&mut self) -> Result<wasmtime::Memory, TrapRecord> {
        self.caller
            .get_export("memory")
            .and_then(Extern::into_memory)
            .ok_or_else(|| {
                TrapRecord::new(
                    TrapReason::MemoryOutOfBounds,
                    BoundsError::MissingMemory.to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::ConfigurationError;
    use crate::interface::{HostFuncDecl, HostOutcome, InterfaceProvider, InterfaceRegistry};

    struct Provider {
        name: &'static str,
        functions: Vec<&'static str>,
    }

    impl InterfaceProvider for Provider {
        fn name(&self) -> &str {
            self.name
        }

        fn functions(&self) -> Vec<HostFuncDecl> {
            self.functions
                .iter()
                .map(|f| HostFuncDecl::new(*f, vec![], vec![], |_, _, _| Ok(HostOutcome::Done)))
                .collect()
        }
    }

    #[test]
    fn providers_merge_deterministically() {
        let mut registry = InterfaceRegistry::new();
        registry
            .register(Arc::new(Provider {
                name: "test",
                functions: vec!["check"],
            }))
            .unwrap();
        registry
            .register(Arc::new(Provider {
                name: "env",
                functions: vec!["read_mem"],
            }))
            .unwrap();
        // Sorted, regardless of registration order.
        assert_eq!(registry.provider_names(), vec!["env", "test"]);
    }

    #[test]
    fn duplicate_provider_is_a_configuration_error() {
        let mut registry = InterfaceRegistry::new();
        registry
            .register(Arc::new(Provider {
                name: "env",
                functions: vec![],
            }))
            .unwrap();
        let err = registry
            .register(Arc::new(Provider {
                name: "env",
                functions: vec![],
            }))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateProvider("env".to_string()));
    }

    #[test]
    fn duplicate_function_within_provider_is_rejected() {
        let mut registry = InterfaceRegistry::new();
        let err = registry
            .register(Arc::new(Provider {
                name: "env",
                functions: vec!["read", "read"],
            }))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateFunction {
                provider: "env".to_string(),
                function: "read".to_string(),
            }
        );
    }

    #[test]
    fn empty_provider_name_is_rejected() {
        let mut registry = InterfaceRegistry::new();
        let err = registry
            .register(Arc::new(Provider {
                name: "",
                functions: vec![],
            }))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyProviderName);
    }
}
