//! Deterministic WebAssembly actor container.
//!
//! `wasmvat` is the adapter between a WebAssembly instance and an actor
//! hypervisor's message model. Each actor owns one instantiated module;
//! messages deliver gas-metered invocations against its exports, host
//! imports are bound from embedder-registered interface providers, and the
//! actor's linear memory, table, and globals can be externalized between
//! invocations for content-addressed persistence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Hypervisor (embedder)                   │
//! │        actor registry · scheduling · state tree · routing        │
//! └───────────────┬──────────────────────────────────┬───────────────┘
//!                 │ Message { funcref, args, gas }   │ externalize /
//!                 ▼                                  ▼ internalize
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │          Dispatcher          │   │           Accessor           │
//! │  resolve → validate → meter  │   │  memory · table · globals    │
//! └──────┬────────────────┬──────┘   └──────────────┬───────────────┘
//!        │ host call      │ deferred                │
//!        ▼                ▼                         ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────────┐
//! │   Interface  │  │  Operations  │  │         ModuleHandle         │
//! │    Binder    │  │    Queue     │  │  store · instance · exports  │
//! └──────────────┘  └──────────────┘  └──────────────────────────────┘
//! ```
//!
//! The bytecode decoder and interpreter are consumed as a capability (the
//! `wasmtime` engine); the container drives it, it does not reimplement it.
//!
//! # Guarantees
//!
//! - One logical invocation per actor at a time, including all of its
//!   suspensions; exclusivity is structural (`&mut`), not mutex-enforced.
//! - Every invocation carries an explicit gas budget; exhaustion aborts
//!   with a distinct out-of-gas outcome and the budget is never observed
//!   negative.
//! - No invocation is reported complete while its operations queue has
//!   outstanding entries; the response channel fires exactly once.
//! - Externalized regions are independent copies; mutating live state
//!   never alters an already-externalized copy.

pub mod accessor;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod funcref;
pub mod gas;
pub mod interface;
pub mod limits;
pub mod module;
pub mod ops;
pub mod runtime;
pub mod testing;
pub mod value;

pub use config::ContainerConfig;
pub use container::WasmContainer;
pub use error::{BoundsError, ConfigurationError, ContainerError, Result, TrapReason, TrapRecord};
pub use runtime::ContainerRuntime;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::accessor::{MemoryRegion, TableRegion, TableSlot};
    pub use crate::config::ContainerConfig;
    pub use crate::container::{CreateMessage, WasmContainer};
    pub use crate::dispatch::{DispatchOutcome, Message, ResponsePayload};
    pub use crate::error::{ContainerError, Result, TrapReason, TrapRecord};
    pub use crate::funcref::{FuncRef, FuncTarget};
    pub use crate::interface::{
        HostCtx, HostFuncDecl, HostOutcome, InterfaceProvider, InterfaceRegistry,
    };
    pub use crate::ops::{DeferredOp, OpResolution, Resume};
    pub use crate::runtime::ContainerRuntime;
    pub use crate::value::WasmValue;
}
