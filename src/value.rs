//! Typed values crossing the container boundary.
//!
//! Message arguments, return values, and globals all travel as
//! [`WasmValue`]. Floats are stored as raw bit patterns so values stay
//! comparable, hashable, and deterministic under serialization.

use serde::{Deserialize, Serialize};
use wasmtime::{Val, ValType};

use crate::funcref::FuncRef;

/// A value passing between the hypervisor and a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum WasmValue {
    I32(i32),
    I64(i64),
    /// `f32` bit pattern.
    F32(u32),
    /// `f64` bit pattern.
    F64(u64),
    /// A first-class function reference.
    Ref(FuncRef),
}

impl WasmValue {
    pub fn from_f32(v: f32) -> Self {
        WasmValue::F32(v.to_bits())
    }

    pub fn from_f64(v: f64) -> Self {
        WasmValue::F64(v.to_bits())
    }

    pub fn i32(&self) -> Option<i32> {
        match self {
            WasmValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn i64(&self) -> Option<i64> {
        match self {
            WasmValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn f32(&self) -> Option<f32> {
        match self {
            WasmValue::F32(bits) => Some(f32::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn f64(&self) -> Option<f64> {
        match self {
            WasmValue::F64(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn func_ref(&self) -> Option<&FuncRef> {
        match self {
            WasmValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this value can be passed for a parameter of the given type.
    pub(crate) fn matches(&self, ty: &ValType) -> bool {
        matches!(
            (self, ty),
            (WasmValue::I32(_), ValType::I32)
                | (WasmValue::I64(_), ValType::I64)
                | (WasmValue::F32(_), ValType::F32)
                | (WasmValue::F64(_), ValType::F64)
                | (WasmValue::Ref(_), ValType::Ref(_))
        )
    }

    /// Raise an engine value produced by the module. Returns `None` for
    /// types the container does not carry across the boundary (v128,
    /// externref, raw funcrefs with no externally meaningful identity).
    pub(crate) fn from_val(val: &Val) -> Option<WasmValue> {
        match val {
            Val::I32(v) => Some(WasmValue::I32(*v)),
            Val::I64(v) => Some(WasmValue::I64(*v)),
            Val::F32(bits) => Some(WasmValue::F32(*bits)),
            Val::F64(bits) => Some(WasmValue::F64(*bits)),
            _ => None,
        }
    }
}

impl From<i32> for WasmValue {
    fn from(v: i32) -> Self {
        WasmValue::I32(v)
    }
}

impl From<i64> for WasmValue {
    fn from(v: i64) -> Self {
        WasmValue::I64(v)
    }
}

impl From<FuncRef> for WasmValue {
    fn from(r: FuncRef) -> Self {
        WasmValue::Ref(r)
    }
}

/// Zero value used for the declared results of a host call that defers.
///
/// The real result, if any, arrives through the callback re-entry.
pub(crate) fn zero_val(ty: &ValType) -> Option<Val> {
    match ty {
        ValType::I32 => Some(Val::I32(0)),
        ValType::I64 => Some(Val::I64(0)),
        ValType::F32 => Some(Val::F32(0)),
        ValType::F64 => Some(Val::F64(0)),
        ValType::Ref(_) => Some(Val::FuncRef(None)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use wasmtime::{Val, ValType};

    use crate::funcref::FuncRef;
    use crate::value::{zero_val, WasmValue};

    #[test]
    fn float_bits_round_trip() {
        let v = WasmValue::from_f32(1.5);
        assert_eq!(v.f32(), Some(1.5));
        let v = WasmValue::from_f64(-0.25);
        assert_eq!(v.f64(), Some(-0.25));
    }

    #[test]
    fn accessors_reject_wrong_variant() {
        let v = WasmValue::I32(7);
        assert_eq!(v.i32(), Some(7));
        assert_eq!(v.i64(), None);
        assert_eq!(v.f64(), None);
    }

    #[test]
    fn type_matching() {
        assert!(WasmValue::I32(0).matches(&ValType::I32));
        assert!(!WasmValue::I32(0).matches(&ValType::I64));
        assert!(WasmValue::Ref(FuncRef::export("run")).matches(&ValType::FUNCREF));
    }

    #[test]
    fn raising_engine_values() {
        assert_eq!(WasmValue::from_val(&Val::I64(-1)), Some(WasmValue::I64(-1)));
        assert_eq!(WasmValue::from_val(&Val::FuncRef(None)), None);
    }

    #[test]
    fn zero_values_cover_numeric_types() {
        assert!(matches!(zero_val(&ValType::I32), Some(Val::I32(0))));
        assert!(matches!(zero_val(&ValType::F64), Some(Val::F64(0))));
        assert!(matches!(zero_val(&ValType::FUNCREF), Some(Val::FuncRef(None))));
    }

    #[test]
    fn serde_shape_is_tagged() {
        let json = serde_json::to_string(&WasmValue::I32(5)).unwrap();
        assert!(json.contains("\"I32\""));
        let back: WasmValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WasmValue::I32(5));
    }
}
