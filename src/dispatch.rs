//! Invocation dispatch.
//!
//! The dispatcher receives a target function reference, arguments, and a
//! gas budget from the hypervisor's message delivery path and drives a
//! single logical call to completion: resolve, validate, run under the
//! meter, park on deferred host calls, drain the operations queue, and
//! re-enter callbacks. Exactly one of success, trap, or out-of-gas is
//! reported per invocation, and never while queue entries are outstanding.
//!
//! Exclusivity is structural: dispatch takes `&mut self`, so one call
//! (including all of its suspensions) finishes before the module's next
//! message is accepted.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use wasmtime::{FuncType, Val, ValType};

use crate::container::WasmContainer;
use crate::error::{ContainerError, TrapReason, TrapRecord};
use crate::funcref::FuncRef;
use crate::module::ModuleHandle;
use crate::ops::InvocationPhase;
use crate::value::{self, WasmValue};

/// Result of one dispatched invocation.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The call returned normally.
    Success {
        values: Vec<WasmValue>,
        gas_residual: u64,
    },
    /// The budget was exhausted mid-execution. Distinct from a generic
    /// trap so the caller can tell the two apart.
    OutOfGas { budget: u64 },
    /// A runtime fault inside the module or a host call.
    Trap {
        record: TrapRecord,
        gas_residual: u64,
    },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }

    pub fn trap_record(&self) -> Option<&TrapRecord> {
        match self {
            DispatchOutcome::Trap { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// A message as delivered by the hypervisor: target, arguments, gas
/// allowance, and the response channel the outcome is written to.
#[derive(Debug)]
pub struct Message {
    pub target: FuncRef,
    pub args: Vec<WasmValue>,
    pub gas: u64,
    pub reply: Option<oneshot::Sender<ResponsePayload>>,
}

impl Message {
    /// Build a message and the receiving half of its response channel.
    pub fn new(
        target: FuncRef,
        args: Vec<WasmValue>,
        gas: u64,
    ) -> (Self, oneshot::Receiver<ResponsePayload>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                target,
                args,
                gas,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// Structured payload written to a message's response channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// True when the invocation (or actor creation) failed.
    pub exception: bool,
    /// The structured failure record when `exception` is set.
    pub trap: Option<TrapRecord>,
    /// Return values on success.
    pub values: Vec<WasmValue>,
    /// Gas left from the allowance, for hypervisor accounting/refund.
    pub gas_residual: u64,
}

impl ResponsePayload {
    pub(crate) fn from_outcome(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Success {
                values,
                gas_residual,
            } => Self {
                exception: false,
                trap: None,
                values,
                gas_residual,
            },
            DispatchOutcome::OutOfGas { budget } => Self {
                exception: true,
                trap: Some(TrapRecord::new(
                    TrapReason::OutOfGas,
                    format!("gas budget {budget} exhausted"),
                )),
                values: Vec::new(),
                gas_residual: 0,
            },
            DispatchOutcome::Trap {
                record,
                gas_residual,
            } => Self {
                exception: true,
                trap: Some(record),
                values: Vec::new(),
                gas_residual,
            },
        }
    }

    /// An invocation that failed before any metered step ran; the full
    /// allowance is refunded.
    pub(crate) fn from_error(err: &ContainerError, refund: u64) -> Self {
        Self {
            exception: true,
            trap: Some(TrapRecord::from_error(err)),
            values: Vec::new(),
            gas_residual: refund,
        }
    }
}

/// Outcome of one metered call frame (the original call or a callback
/// re-entry).
enum MeteredCall {
    Values(Vec<WasmValue>),
    OutOfGas,
    Trap(TrapRecord),
}

impl WasmContainer {
    /// Drive one logical call to completion.
    ///
    /// The budget is explicit; there is no unlimited default. Errors
    /// returned here are pre-execution failures (unknown export, arity or
    /// type mismatch, bad function reference) — the allowance was not
    /// touched.
    pub async fn dispatch(
        &mut self,
        target: &FuncRef,
        args: &[WasmValue],
        gas: u64,
    ) -> Result<DispatchOutcome, ContainerError> {
        let invocation = Uuid::new_v4();
        tracing::debug!(
            %invocation,
            %target,
            gas,
            phase = %InvocationPhase::Running,
            "dispatching invocation"
        );

        let mut values = match self.call_metered(target, args, gas)? {
            MeteredCall::Values(values) => values,
            MeteredCall::OutOfGas => {
                self.handle.clear_ops();
                tracing::debug!(%invocation, budget = gas, "invocation ran out of gas");
                return Ok(DispatchOutcome::OutOfGas { budget: gas });
            }
            MeteredCall::Trap(record) => {
                self.handle.clear_ops();
                tracing::debug!(%invocation, reason = %record.reason, "invocation trapped");
                return Ok(DispatchOutcome::Trap {
                    gas_residual: self.handle.fuel()?,
                    record,
                });
            }
        };

        // Operations deferred by host calls during the frame. Entries
        // resolve in completion order; a resolution may enqueue more
        // entries or re-enter the module through a callback.
        let mut queue = FuturesUnordered::new();
        for op in self.handle.take_ops() {
            queue.push(op.into_future());
        }
        if !queue.is_empty() {
            tracing::trace!(
                %invocation,
                pending = queue.len(),
                phase = %InvocationPhase::Suspended,
                "invocation parked on operations queue"
            );
        }

        while let Some(resolution) = queue.next().await {
            tracing::trace!(%invocation, phase = %InvocationPhase::Draining, "operation resolved");

            if let Some(record) = resolution.trap {
                tracing::warn!(%invocation, reason = %record.reason, "deferred operation failed");
                self.handle.clear_ops();
                return Ok(DispatchOutcome::Trap {
                    gas_residual: self.handle.fuel()?,
                    record,
                });
            }

            for op in resolution.follow_up {
                queue.push(op.into_future());
            }

            if let Some(resume) = resolution.callback {
                tracing::trace!(
                    %invocation,
                    target = %resume.target,
                    phase = %InvocationPhase::Resumed,
                    "re-entering module through callback"
                );
                let residual = self.handle.fuel()?;
                let cb_gas = resume.gas.or(resume.target.gas()).unwrap_or(residual);
                let cb_args = if resume.args.is_empty() {
                    resume.target.args().to_vec()
                } else {
                    resume.args
                };
                let reentry = match self.call_metered(&resume.target, &cb_args, cb_gas) {
                    Ok(call) => call,
                    Err(err) => {
                        self.handle.clear_ops();
                        return Ok(DispatchOutcome::Trap {
                            gas_residual: self.handle.fuel()?,
                            record: TrapRecord::from_error(&err),
                        });
                    }
                };
                match reentry {
                    MeteredCall::Values(reentry_values) => values = reentry_values,
                    MeteredCall::OutOfGas => {
                        self.handle.clear_ops();
                        return Ok(DispatchOutcome::OutOfGas { budget: gas });
                    }
                    MeteredCall::Trap(record) => {
                        self.handle.clear_ops();
                        return Ok(DispatchOutcome::Trap {
                            gas_residual: self.handle.fuel()?,
                            record,
                        });
                    }
                }
                for op in self.handle.take_ops() {
                    queue.push(op.into_future());
                }
            }
        }

        let gas_residual = self.handle.fuel()?;
        tracing::debug!(
            %invocation,
            gas_residual,
            phase = %InvocationPhase::Terminal,
            "invocation complete"
        );
        Ok(DispatchOutcome::Success {
            values,
            gas_residual,
        })
    }

    /// Deliver a message: dispatch it and write the structured payload to
    /// the response channel exactly once.
    pub async fn deliver(&mut self, message: Message) {
        let Message {
            target,
            args,
            gas,
            reply,
        } = message;
        // Arguments bound on the reference apply when the message itself
        // carries none.
        let args = if args.is_empty() && !target.args().is_empty() {
            target.args().to_vec()
        } else {
            args
        };
        let payload = match self.dispatch(&target, &args, gas).await {
            Ok(outcome) => ResponsePayload::from_outcome(outcome),
            Err(err) => ResponsePayload::from_error(&err, gas),
        };
        match reply {
            Some(reply) => {
                if reply.send(payload).is_err() {
                    tracing::trace!("response receiver dropped before delivery");
                }
            }
            None => tracing::trace!("message carried no response channel"),
        }
    }

    /// One gas-metered call frame.
    fn call_metered(
        &mut self,
        target: &FuncRef,
        args: &[WasmValue],
        gas: u64,
    ) -> Result<MeteredCall, ContainerError> {
        let func = self.handle.resolve(target.target())?;
        let ty = func.ty(self.handle.store());
        let params = lower_args(&mut self.handle, args, &ty)?;
        let mut results = zeroed_results(&ty)?;
        self.handle.set_fuel(gas)?;
        match func.call(self.handle.store_mut(), &params, &mut results) {
            Ok(()) => Ok(MeteredCall::Values(raise_results(&results)?)),
            Err(err) => {
                let record = TrapRecord::from_runtime(&err);
                if record.reason == TrapReason::OutOfGas {
                    Ok(MeteredCall::OutOfGas)
                } else {
                    Ok(MeteredCall::Trap(record))
                }
            }
        }
    }
}

/// Lower boundary values into engine values, validating count and types
/// against the export's signature.
fn lower_args(
    handle: &mut ModuleHandle,
    args: &[WasmValue],
    ty: &FuncType,
) -> Result<Vec<Val>, ContainerError> {
    let params: Vec<ValType> = ty.params().collect();
    if params.len() != args.len() {
        return Err(ContainerError::InvalidInvocation(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    let mut lowered = Vec::with_capacity(args.len());
    for (i, (arg, param)) in args.iter().zip(&params).enumerate() {
        if !arg.matches(param) {
            return Err(ContainerError::InvalidInvocation(format!(
                "argument {i} type mismatch"
            )));
        }
        let val = match arg {
            WasmValue::I32(v) => Val::I32(*v),
            WasmValue::I64(v) => Val::I64(*v),
            WasmValue::F32(bits) => Val::F32(*bits),
            WasmValue::F64(bits) => Val::F64(*bits),
            // A function-reference argument must resolve within the
            // receiving module; cross-actor references are routed by the
            // hypervisor as message targets, not lowered into wasm.
            WasmValue::Ref(funcref) => {
                let func = handle.resolve(funcref.target())?;
                Val::FuncRef(Some(func))
            }
        };
        lowered.push(val);
    }
    Ok(lowered)
}

/// Zero-initialized result slots for a call frame.
fn zeroed_results(ty: &FuncType) -> Result<Vec<Val>, ContainerError> {
    ty.results()
        .map(|t| {
            value::zero_val(&t).ok_or_else(|| {
                ContainerError::InvalidInvocation("unsupported result type".to_string())
            })
        })
        .collect()
}

/// Raise engine results back into boundary values.
fn raise_results(results: &[Val]) -> Result<Vec<WasmValue>, ContainerError> {
    results
        .iter()
        .map(|v| {
            WasmValue::from_val(v).ok_or_else(|| {
                ContainerError::InvalidInvocation("unsupported result type".to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::dispatch::{DispatchOutcome, ResponsePayload};
    use crate::error::{ContainerError, TrapReason, TrapRecord};
    use crate::value::WasmValue;

    #[test]
    fn success_payload_carries_values_and_residual() {
        let payload = ResponsePayload::from_outcome(DispatchOutcome::Success {
            values: vec![WasmValue::I32(7)],
            gas_residual: 42,
        });
        assert!(!payload.exception);
        assert_eq!(payload.values, vec![WasmValue::I32(7)]);
        assert_eq!(payload.gas_residual, 42);
    }

    #[test]
    fn out_of_gas_payload_is_an_exception_with_zero_residual() {
        let payload = ResponsePayload::from_outcome(DispatchOutcome::OutOfGas { budget: 100 });
        assert!(payload.exception);
        assert_eq!(payload.gas_residual, 0);
        assert_eq!(payload.trap.unwrap().reason, TrapReason::OutOfGas);
    }

    #[test]
    fn trap_payload_keeps_the_record() {
        let payload = ResponsePayload::from_outcome(DispatchOutcome::Trap {
            record: TrapRecord::new(TrapReason::Unreachable, "unreachable"),
            gas_residual: 3,
        });
        assert!(payload.exception);
        assert_eq!(payload.trap.unwrap().reason, TrapReason::Unreachable);
        assert_eq!(payload.gas_residual, 3);
    }

    #[test]
    fn pre_execution_failure_refunds_the_allowance() {
        let err = ContainerError::InvalidInvocation("expected 1 arguments, got 0".to_string());
        let payload = ResponsePayload::from_error(&err, 500);
        assert!(payload.exception);
        assert_eq!(payload.gas_residual, 500);
        assert_eq!(payload.trap.unwrap().reason, TrapReason::InvalidInvocation);
    }

    #[test]
    fn payload_serializes_with_an_exception_flag() {
        let payload = ResponsePayload::from_outcome(DispatchOutcome::Success {
            values: vec![],
            gas_residual: 0,
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"exception\":false"));
    }
}
