//! First-class references to callable module entry points.
//!
//! A [`FuncRef`] names one callable export (or table slot) of an actor's
//! module. The identity is serializable so a reference stays valid and
//! resolvable when passed as a message argument across the actor boundary;
//! the hypervisor routes it to the owning actor, where the dispatcher
//! resolves it against the module handle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::WasmValue;

/// Which callable entry of the owning module a reference names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncTarget {
    /// A named export.
    Export(String),
    /// A slot in the module's table.
    Table(u64),
}

impl fmt::Display for FuncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncTarget::Export(name) => write!(f, "export:{}", name),
            FuncTarget::Table(index) => write!(f, "table:{}", index),
        }
    }
}

/// An opaque, comparable handle to one callable entry, optionally carrying
/// a gas allowance and arguments bound at send time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncRef {
    target: FuncTarget,
    gas: Option<u64>,
    args: Vec<WasmValue>,
}

impl FuncRef {
    /// Reference a named export.
    pub fn export(name: impl Into<String>) -> Self {
        Self {
            target: FuncTarget::Export(name.into()),
            gas: None,
            args: Vec::new(),
        }
    }

    /// Reference a table slot.
    pub fn table(index: u64) -> Self {
        Self {
            target: FuncTarget::Table(index),
            gas: None,
            args: Vec::new(),
        }
    }

    /// Attach a gas allowance for the call this reference will receive.
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    /// Bind arguments to apply when no explicit argument list accompanies
    /// the call.
    pub fn with_args(mut self, args: Vec<WasmValue>) -> Self {
        self.args = args;
        self
    }

    pub fn target(&self) -> &FuncTarget {
        &self.target
    }

    pub fn gas(&self) -> Option<u64> {
        self.gas
    }

    pub fn args(&self) -> &[WasmValue] {
        &self.args
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.target.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::funcref::{FuncRef, FuncTarget};
    use crate::value::WasmValue;

    #[test]
    fn references_are_comparable() {
        let a = FuncRef::export("run");
        let b = FuncRef::export("run");
        let c = FuncRef::table(0);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn attachments_participate_in_identity() {
        let bare = FuncRef::export("recv");
        let loaded = FuncRef::export("recv")
            .with_gas(300)
            .with_args(vec![WasmValue::I32(5)]);
        assert_ne!(bare, loaded);
        assert_eq!(loaded.gas(), Some(300));
        assert_eq!(loaded.args(), &[WasmValue::I32(5)]);
    }

    #[test]
    fn identity_survives_the_actor_boundary() {
        let reference = FuncRef::table(3).with_gas(100);
        let wire = serde_json::to_string(&reference).unwrap();
        let back: FuncRef = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, reference);
        assert_eq!(back.target(), &FuncTarget::Table(3));
    }

    #[test]
    fn display_names_the_target() {
        assert_eq!(FuncRef::export("run").to_string(), "export:run");
        assert_eq!(FuncRef::table(8).to_string(), "table:8");
    }
}
