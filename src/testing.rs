//! Test support for embedders.
//!
//! Provides [`CheckInterface`], a result-reporting capability injected as
//! an ordinary interface provider for the scope of one test run. Modules
//! under test import `test.check` and report assertion outcomes through
//! it; the paired [`CheckRecorder`] is read back by the harness. There is
//! no process-wide mutable test state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wasmtime::ValType;

use crate::config::ContainerConfig;
use crate::error::ContainerError;
use crate::interface::{HostFuncDecl, HostOutcome, InterfaceProvider, InterfaceRegistry};
use crate::runtime::ContainerRuntime;

/// Counts of assertion outcomes reported by a module under test.
#[derive(Debug, Default)]
pub struct CheckRecorder {
    passed: AtomicUsize,
    failed: AtomicUsize,
}

impl CheckRecorder {
    pub fn passed(&self) -> usize {
        self.passed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn record(&self, ok: bool) {
        if ok {
            self.passed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// The `"test"` interface provider: `test.check(i32)` records a pass for
/// any nonzero argument and a failure for zero.
pub struct CheckInterface {
    recorder: Arc<CheckRecorder>,
}

impl CheckInterface {
    /// Build the provider and the recorder handle the harness reads back.
    pub fn new() -> (Arc<Self>, Arc<CheckRecorder>) {
        let recorder = Arc::new(CheckRecorder::default());
        (
            Arc::new(Self {
                recorder: Arc::clone(&recorder),
            }),
            recorder,
        )
    }
}

impl InterfaceProvider for CheckInterface {
    fn name(&self) -> &str {
        "test"
    }

    fn functions(&self) -> Vec<HostFuncDecl> {
        let recorder = Arc::clone(&self.recorder);
        vec![HostFuncDecl::new(
            "check",
            vec![ValType::I32],
            vec![],
            move |_ctx, params, _results| {
                let ok = params[0].i32().unwrap_or(0) != 0;
                recorder.record(ok);
                Ok(HostOutcome::Done)
            },
        )]
    }
}

/// A runtime with testing limits and the given providers registered.
pub fn test_runtime(
    providers: Vec<Arc<dyn InterfaceProvider>>,
) -> Result<Arc<ContainerRuntime>, ContainerError> {
    let mut registry = InterfaceRegistry::new();
    for provider in providers {
        registry.register(provider)?;
    }
    Ok(Arc::new(ContainerRuntime::new(
        ContainerConfig::for_testing(),
        registry,
    )?))
}

#[cfg(test)]
mod tests {
    use crate::testing::CheckInterface;
    use crate::interface::InterfaceProvider;

    #[test]
    fn recorder_counts_outcomes() {
        let (provider, recorder) = CheckInterface::new();
        assert_eq!(provider.name(), "test");
        recorder.record(true);
        recorder.record(true);
        recorder.record(false);
        assert_eq!(recorder.passed(), 2);
        assert_eq!(recorder.failed(), 1);
    }
}
