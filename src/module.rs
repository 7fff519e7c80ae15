//! Module handle: one instantiated WebAssembly module and its storage.
//!
//! Created once per actor at creation time and destroyed when the actor is
//! evicted. Instantiation fails closed: malformed bytecode or an
//! unresolvable import returns an error to the caller and no partially
//! initialized handle escapes.

use std::collections::HashMap;

use wasmtime::{
    Engine, Extern, Func, FuncType, Global, Linker, Memory, Module, Ref, Store, Table,
};

use crate::config::ContainerConfig;
use crate::error::{BoundsError, ContainerError};
use crate::funcref::{FuncRef, FuncTarget};
use crate::limits::ActorLimiter;
use crate::ops::DeferredOp;

/// Store data carried alongside the module instance.
pub struct ActorState {
    pub(crate) limiter: ActorLimiter,
    /// Operations deferred by host calls during the current call frame.
    /// Collected by the dispatcher after the frame returns.
    pub(crate) ops: Vec<DeferredOp>,
}

impl ActorState {
    fn new(config: &ContainerConfig) -> Self {
        Self {
            limiter: ActorLimiter::new(config.memory_limit, config.table_limit),
            ops: Vec::new(),
        }
    }
}

/// One instantiated module: store, instance, and resolved exports.
pub struct ModuleHandle {
    store: Store<ActorState>,
    funcs: HashMap<String, Func>,
    globals: HashMap<String, Global>,
    memory: Option<Memory>,
    table: Option<Table>,
}

impl ModuleHandle {
    /// Decode, link, and instantiate `bytecode`.
    ///
    /// Instantiation runs under the configured creation budget; segment
    /// initialization and a start function are metered like any other
    /// execution.
    pub(crate) fn instantiate(
        engine: &Engine,
        linker: &Linker<ActorState>,
        config: &ContainerConfig,
        bytecode: &[u8],
    ) -> Result<Self, ContainerError> {
        let module =
            Module::new(engine, bytecode).map_err(|e| ContainerError::Decode(e.to_string()))?;

        let mut store = Store::new(engine, ActorState::new(config));
        store.limiter(|state| &mut state.limiter);
        store
            .set_fuel(config.creation_gas)
            .map_err(|e| ContainerError::Engine(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| ContainerError::Link(e.to_string()))?;

        let exports: Vec<(String, Extern)> = instance
            .exports(&mut store)
            .map(|export| {
                let name = export.name().to_string();
                (name, export.into_extern())
            })
            .collect();

        let mut funcs = HashMap::new();
        let mut globals = HashMap::new();
        let mut memory = None;
        let mut table = None;
        for (name, ext) in exports {
            match ext {
                Extern::Func(f) => {
                    funcs.insert(name, f);
                }
                Extern::Global(g) => {
                    globals.insert(name, g);
                }
                Extern::Memory(m) => {
                    // The conventional "memory" export wins when a module
                    // exports more than one.
                    if memory.is_none() || name == "memory" {
                        memory = Some(m);
                    }
                }
                Extern::Table(t) => {
                    if table.is_none() || name == "table" {
                        table = Some(t);
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            store,
            funcs,
            globals,
            memory,
            table,
        })
    }

    /// Resolve a named export into a function reference.
    pub fn func_ref(&self, name: &str) -> Result<FuncRef, ContainerError> {
        if self.funcs.contains_key(name) {
            Ok(FuncRef::export(name))
        } else {
            Err(ContainerError::InvalidInvocation(format!(
                "unknown export {name:?}"
            )))
        }
    }

    /// Inventory of callable exports and their signatures.
    pub fn exports(&self) -> Vec<(String, FuncType)> {
        let mut entries: Vec<(String, FuncType)> = self
            .funcs
            .iter()
            .map(|(name, func)| (name.clone(), func.ty(&self.store)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Resolve a function target against this module.
    pub(crate) fn resolve(&mut self, target: &FuncTarget) -> Result<Func, ContainerError> {
        match target {
            FuncTarget::Export(name) => self.funcs.get(name).copied().ok_or_else(|| {
                ContainerError::BadFuncRef(format!("unknown export {name:?}"))
            }),
            FuncTarget::Table(index) => {
                let table = self.table.ok_or(BoundsError::MissingTable)?;
                let size = table.size(&self.store);
                if *index >= size {
                    return Err(ContainerError::BadFuncRef(format!(
                        "table slot {index} out of bounds for table of {size} entries"
                    )));
                }
                match table.get(&mut self.store, *index) {
                    Some(Ref::Func(Some(func))) => Ok(func),
                    Some(Ref::Func(None)) | None => Err(ContainerError::BadFuncRef(format!(
                        "null function reference at table slot {index}"
                    ))),
                    Some(_) => Err(ContainerError::BadFuncRef(format!(
                        "table slot {index} does not hold a function"
                    ))),
                }
            }
        }
    }

    pub(crate) fn memory(&self) -> Result<Memory, BoundsError> {
        self.memory.ok_or(BoundsError::MissingMemory)
    }

    pub(crate) fn table(&self) -> Result<Table, BoundsError> {
        self.table.ok_or(BoundsError::MissingTable)
    }

    pub(crate) fn global(&self, name: &str) -> Result<Global, ContainerError> {
        self.globals.get(name).copied().ok_or_else(|| {
            ContainerError::InvalidInvocation(format!("unknown global {name:?}"))
        })
    }

    pub(crate) fn set_fuel(&mut self, gas: u64) -> Result<(), ContainerError> {
        self.store
            .set_fuel(gas)
            .map_err(|e| ContainerError::Engine(e.to_string()))
    }

    pub(crate) fn fuel(&self) -> Result<u64, ContainerError> {
        self.store
            .get_fuel()
            .map_err(|e| ContainerError::Engine(e.to_string()))
    }

    /// Take the operations deferred during the last call frame.
    pub(crate) fn take_ops(&mut self) -> Vec<DeferredOp> {
        std::mem::take(&mut self.store.data_mut().ops)
    }

    /// Drop any deferred operations after an aborted invocation.
    pub(crate) fn clear_ops(&mut self) {
        self.store.data_mut().ops.clear();
    }

    pub(crate) fn store(&self) -> &Store<ActorState> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store<ActorState> {
        &mut self.store
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ModuleHandle")
            .field("funcs", &names)
            .field("memory", &self.memory.is_some())
            .field("table", &self.table.is_some())
            .finish()
    }
}
