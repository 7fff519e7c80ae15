//! The container facade handed to the hypervisor.
//!
//! One [`WasmContainer`] per actor: it owns the module handle and exposes
//! function-reference resolution, the accessor operations, and message
//! dispatch. Accessor calls are safe exactly when no invocation is in
//! flight, which the `&mut` receiver makes structural.

use std::sync::Arc;

use tokio::sync::oneshot;
use wasmtime::FuncType;

use crate::dispatch::ResponsePayload;
use crate::error::ContainerError;
use crate::funcref::FuncRef;
use crate::module::ModuleHandle;
use crate::runtime::ContainerRuntime;

/// An actor-creation request: raw module bytecode plus the channel a
/// creation failure is reported on.
#[derive(Debug)]
pub struct CreateMessage {
    pub bytecode: Vec<u8>,
    pub reply: Option<oneshot::Sender<ResponsePayload>>,
}

impl CreateMessage {
    pub fn new(bytecode: Vec<u8>) -> (Self, oneshot::Receiver<ResponsePayload>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytecode,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// One actor's execution container.
pub struct WasmContainer {
    runtime: Arc<ContainerRuntime>,
    pub(crate) handle: ModuleHandle,
}

impl WasmContainer {
    /// Instantiate a container for `bytecode`.
    ///
    /// Fails closed: malformed bytecode or unresolvable imports return an
    /// error and no partially initialized container escapes.
    pub fn create(
        runtime: Arc<ContainerRuntime>,
        bytecode: &[u8],
    ) -> Result<Self, ContainerError> {
        runtime.registry().notify_instantiation(bytecode);
        let linker = runtime
            .registry()
            .bind(runtime.engine(), runtime.config().host_call_cost)?;
        let handle =
            ModuleHandle::instantiate(runtime.engine(), &linker, runtime.config(), bytecode)?;
        tracing::info!(handle = ?handle, "actor instantiated");
        Ok(Self { runtime, handle })
    }

    /// The actor-creation path for message-delivered bytecode.
    ///
    /// When the payload is not valid module bytecode the actor is left
    /// unconstructed: the creation failure is written to the message's
    /// response channel as an exception payload and `None` is returned.
    /// The raw decode error never propagates.
    pub fn create_actor(
        runtime: Arc<ContainerRuntime>,
        mut message: CreateMessage,
    ) -> Option<Self> {
        match Self::create(runtime, &message.bytecode) {
            Ok(container) => Some(container),
            Err(err) => {
                tracing::warn!(error = %err, "actor creation failed");
                let payload = ResponsePayload::from_error(&err, 0);
                if let Some(reply) = message.reply.take() {
                    let _ = reply.send(payload);
                }
                None
            }
        }
    }

    /// Resolve a named export into a function reference.
    pub fn func_ref(&self, name: &str) -> Result<FuncRef, ContainerError> {
        self.handle.func_ref(name)
    }

    /// Inventory of callable exports and their signatures.
    pub fn exports(&self) -> Vec<(String, FuncType)> {
        self.handle.exports()
    }

    pub fn runtime(&self) -> &Arc<ContainerRuntime> {
        &self.runtime
    }
}

impl std::fmt::Debug for WasmContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmContainer")
            .field("handle", &self.handle)
            .finish()
    }
}
