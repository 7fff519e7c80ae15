//! Deferred host operations.
//!
//! A host call declared asynchronous does not return its result to the
//! module directly; it parks a [`DeferredOp`] on the invocation's
//! operations queue and the call frame continues with zeroed results. The
//! dispatcher drains the queue after the module returns: operations
//! resolve in completion order (not enqueue order), a resolution may
//! enqueue further operations (nested suspension), and a resolution
//! carrying a [`Resume`] re-enters the module through a fresh gas-metered
//! call. The invocation is reported to the hypervisor only once the queue
//! is empty.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::error::TrapRecord;
use crate::funcref::FuncRef;
use crate::value::WasmValue;

/// A pending asynchronous unit of work raised by a host call.
pub struct DeferredOp {
    future: BoxFuture<'static, OpResolution>,
}

impl DeferredOp {
    pub fn new(future: impl Future<Output = OpResolution> + Send + 'static) -> Self {
        Self {
            future: Box::pin(future),
        }
    }

    /// An operation that is already resolved. Still takes a full trip
    /// through the queue, so suspension/resumption ordering is identical
    /// to a genuinely asynchronous operation.
    pub fn resolved(resolution: OpResolution) -> Self {
        Self::new(std::future::ready(resolution))
    }

    pub(crate) fn into_future(self) -> BoxFuture<'static, OpResolution> {
        self.future
    }
}

impl fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredOp")
    }
}

/// What a deferred operation produced when it resolved.
#[derive(Debug, Default)]
pub struct OpResolution {
    /// Re-enter the module through this call once the resolution is
    /// processed. Supplied explicitly by the provider; never inferred.
    pub callback: Option<Resume>,
    /// Further operations to enqueue (nested suspension).
    pub follow_up: Vec<DeferredOp>,
    /// A failure the provider chose to treat as fatal to the invocation.
    pub trap: Option<TrapRecord>,
}

impl OpResolution {
    /// Resolve with no callback and no follow-up work.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve into a callback re-entry.
    pub fn with_callback(target: FuncRef) -> Self {
        Self {
            callback: Some(Resume::new(target)),
            ..Self::default()
        }
    }

    /// Resolve into a failure that aborts the invocation.
    pub fn failed(trap: TrapRecord) -> Self {
        Self {
            trap: Some(trap),
            ..Self::default()
        }
    }

    /// Enqueue a further operation along with this resolution.
    pub fn then(mut self, op: DeferredOp) -> Self {
        self.follow_up.push(op);
        self
    }
}

/// A callback re-entry request: target, arguments, and an optional gas
/// budget for the fresh call (the invocation's residual gas applies when
/// absent).
#[derive(Debug, Clone, PartialEq)]
pub struct Resume {
    pub target: FuncRef,
    pub args: Vec<WasmValue>,
    pub gas: Option<u64>,
}

impl Resume {
    pub fn new(target: FuncRef) -> Self {
        Self {
            target,
            args: Vec::new(),
            gas: None,
        }
    }

    pub fn with_args(mut self, args: Vec<WasmValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }
}

/// Phases one invocation moves through. Used for trace-level logging and
/// the drain loop's bookkeeping; the hypervisor only ever observes
/// `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvocationPhase {
    Running,
    Suspended,
    Draining,
    Resumed,
    Terminal,
}

impl fmt::Display for InvocationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationPhase::Running => "running",
            InvocationPhase::Suspended => "suspended",
            InvocationPhase::Draining => "draining",
            InvocationPhase::Resumed => "resumed",
            InvocationPhase::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use crate::error::{TrapReason, TrapRecord};
    use crate::funcref::FuncRef;
    use crate::ops::{DeferredOp, OpResolution, Resume};
    use crate::value::WasmValue;

    #[tokio::test]
    async fn resolved_op_completes_immediately() {
        let op = DeferredOp::resolved(OpResolution::with_callback(FuncRef::table(0)));
        let resolution = op.into_future().await;
        assert_eq!(
            resolution.callback.as_ref().map(|r| &r.target),
            Some(&FuncRef::table(0))
        );
        assert!(resolution.follow_up.is_empty());
        assert!(resolution.trap.is_none());
    }

    #[tokio::test]
    async fn follow_up_ops_ride_along() {
        let inner = DeferredOp::resolved(OpResolution::empty());
        let resolution = DeferredOp::resolved(OpResolution::empty().then(inner))
            .into_future()
            .await;
        assert_eq!(resolution.follow_up.len(), 1);
    }

    #[test]
    fn resume_builder() {
        let resume = Resume::new(FuncRef::export("on_done"))
            .with_args(vec![WasmValue::I32(1)])
            .with_gas(500);
        assert_eq!(resume.gas, Some(500));
        assert_eq!(resume.args.len(), 1);
    }

    #[test]
    fn failed_resolution_carries_the_record() {
        let resolution =
            OpResolution::failed(TrapRecord::new(TrapReason::Host, "provider failure"));
        assert_eq!(resolution.trap.as_ref().unwrap().reason, TrapReason::Host);
    }

    #[test]
    fn pending_future_does_not_resolve_synchronously() {
        let op = DeferredOp::new(std::future::pending::<OpResolution>());
        assert!(op.into_future().now_or_never().is_none());
    }
}
