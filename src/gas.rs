//! Gas metering on top of engine fuel.
//!
//! The engine debits fuel per executed instruction; the container adds a
//! per-crossing debit for host calls. Debits are checked: a debit that
//! would drive the budget below zero aborts with an out-of-gas record
//! before anything is committed, so the budget is never observed negative.

use wasmtime::AsContextMut;

use crate::error::{TrapReason, TrapRecord};

/// Debit `cost` gas from the store's remaining budget.
///
/// On an insufficient budget the remainder is zeroed and an out-of-gas
/// record returned; the caller must abort the step without committing its
/// side effects.
pub(crate) fn debit(mut store: impl AsContextMut, cost: u64) -> Result<(), TrapRecord> {
    let mut ctx = store.as_context_mut();
    let remaining = ctx
        .get_fuel()
        .map_err(|e| TrapRecord::new(TrapReason::Host, e.to_string()))?;
    if remaining < cost {
        ctx.set_fuel(0)
            .map_err(|e| TrapRecord::new(TrapReason::Host, e.to_string()))?;
        return Err(TrapRecord::new(
            TrapReason::OutOfGas,
            format!("debit of {cost} gas exceeds remaining budget {remaining}"),
        ));
    }
    ctx.set_fuel(remaining - cost)
        .map_err(|e| TrapRecord::new(TrapReason::Host, e.to_string()))?;
    Ok(())
}

/// Gas remaining in the store's current budget.
pub(crate) fn remaining(mut store: impl AsContextMut) -> Result<u64, TrapRecord> {
    store
        .as_context_mut()
        .get_fuel()
        .map_err(|e| TrapRecord::new(TrapReason::Host, e.to_string()))
}

#[cfg(test)]
mod tests {
    use wasmtime::{Config, Engine, Store};

    use crate::error::TrapReason;
    use crate::gas::{debit, remaining};

    fn metered_store() -> Store<()> {
        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config).unwrap();
        Store::new(&engine, ())
    }

    #[test]
    fn debit_decrements_budget() {
        let mut store = metered_store();
        store.set_fuel(100).unwrap();
        debit(&mut store, 40).unwrap();
        assert_eq!(remaining(&mut store).unwrap(), 60);
    }

    #[test]
    fn insufficient_budget_aborts_without_underflow() {
        let mut store = metered_store();
        store.set_fuel(30).unwrap();
        let err = debit(&mut store, 31).unwrap_err();
        assert_eq!(err.reason, TrapReason::OutOfGas);
        // The budget is zeroed, never negative.
        assert_eq!(remaining(&mut store).unwrap(), 0);
    }

    #[test]
    fn exact_budget_is_spendable() {
        let mut store = metered_store();
        store.set_fuel(25).unwrap();
        debit(&mut store, 25).unwrap();
        assert_eq!(remaining(&mut store).unwrap(), 0);
    }
}
