//! Per-actor resource ceilings.
//!
//! An [`ActorLimiter`] is attached to each actor's store and bounds linear
//! memory and table growth. Denied growth is observable by the module
//! (`memory.grow` returns -1); it is not a trap.

use wasmtime::ResourceLimiter;

/// Wasmtime `ResourceLimiter` enforcing one actor's memory and table
/// ceilings.
#[derive(Debug)]
pub struct ActorLimiter {
    memory_limit: u64,
    memory_used: u64,
    table_limit: u64,
}

impl ActorLimiter {
    pub fn new(memory_limit: u64, table_limit: u64) -> Self {
        Self {
            memory_limit,
            memory_used: 0,
            table_limit,
        }
    }

    /// Linear memory currently committed, in bytes.
    pub fn memory_used(&self) -> u64 {
        self.memory_used
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }
}

impl ResourceLimiter for ActorLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        let desired_u64 = desired as u64;

        if desired_u64 > self.memory_limit {
            tracing::warn!(
                current,
                desired,
                limit = self.memory_limit,
                "actor memory growth denied: would exceed limit"
            );
            return Ok(false);
        }

        self.memory_used = desired_u64;
        tracing::trace!(current, desired, "actor memory growth allowed");
        Ok(true)
    }

    fn table_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired as u64 > self.table_limit {
            tracing::warn!(
                current,
                desired,
                limit = self.table_limit,
                "actor table growth denied: would exceed limit"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn instances(&self) -> usize {
        // One module instance per actor.
        1
    }

    fn tables(&self) -> usize {
        1
    }

    fn memories(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use wasmtime::ResourceLimiter;

    use crate::limits::ActorLimiter;

    #[test]
    fn growth_within_limit_is_allowed() {
        let mut limiter = ActorLimiter::new(1024 * 1024, 256);
        let allowed = limiter.memory_growing(0, 64 * 1024, None).unwrap();
        assert!(allowed);
        assert_eq!(limiter.memory_used(), 64 * 1024);
    }

    #[test]
    fn growth_beyond_limit_is_denied() {
        let mut limiter = ActorLimiter::new(1024 * 1024, 256);
        let allowed = limiter.memory_growing(0, 2 * 1024 * 1024, None).unwrap();
        assert!(!allowed);
        assert_eq!(limiter.memory_used(), 0);
    }

    #[test]
    fn table_growth_respects_limit() {
        let mut limiter = ActorLimiter::new(1024 * 1024, 16);
        assert!(limiter.table_growing(0, 16, None).unwrap());
        assert!(!limiter.table_growing(16, 17, None).unwrap());
    }
}
