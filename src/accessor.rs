//! Memory, table, and globals access.
//!
//! Byte-range and slot-range read/write over an actor's live storage,
//! plus typed access to named globals. The hypervisor uses these between
//! invocations to externalize actor state into its persistent store and to
//! internalize previously stored state back in; host-call providers use
//! the same primitives through [`crate::interface::HostCtx`].
//!
//! All range operations bounds-check against the current memory/table
//! size and fail with a distinguished [`BoundsError`] rather than
//! truncating or wrapping. Writes mutate live storage directly.
//! Externalized regions are independent copies: mutating the module
//! afterwards does not change an already-externalized region.

use serde::{Deserialize, Serialize};
use wasmtime::{Func, Mutability, Ref, Val};

use crate::container::WasmContainer;
use crate::error::{BoundsError, ContainerError};
use crate::value::WasmValue;

/// An externalized copy of a contiguous byte range of linear memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl MemoryRegion {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One externalized table slot: either empty or an opaque function entry.
#[derive(Debug, Clone)]
pub struct TableSlot(pub(crate) Option<Func>);

impl TableSlot {
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

/// An externalized copy of a contiguous slot range of the table.
#[derive(Debug, Clone)]
pub struct TableRegion {
    pub offset: u64,
    entries: Vec<TableSlot>,
}

impl TableRegion {
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TableSlot] {
        &self.entries
    }

    /// Which slots are empty, in slot order.
    pub fn null_mask(&self) -> Vec<bool> {
        self.entries.iter().map(TableSlot::is_null).collect()
    }
}

impl WasmContainer {
    /// Read a byte range from linear memory.
    pub fn read_memory(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, ContainerError> {
        let memory = self.handle.memory()?;
        let size = memory.data_size(self.handle.store()) as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(BoundsError::Memory { offset, len, size }.into());
        }
        let mut buf = vec![0u8; len as usize];
        memory
            .read(self.handle.store(), offset as usize, &mut buf)
            .map_err(|e| ContainerError::Engine(e.to_string()))?;
        Ok(buf)
    }

    /// Write bytes into linear memory at `offset`.
    pub fn write_memory(&mut self, offset: u64, bytes: &[u8]) -> Result<(), ContainerError> {
        let memory = self.handle.memory()?;
        let size = memory.data_size(self.handle.store()) as u64;
        let len = bytes.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(BoundsError::Memory { offset, len, size }.into());
        }
        memory
            .write(self.handle.store_mut(), offset as usize, bytes)
            .map_err(|e| ContainerError::Engine(e.to_string()))
    }

    /// Copy a byte range out as an independent region.
    pub fn externalize_memory(
        &mut self,
        offset: u64,
        len: u64,
    ) -> Result<MemoryRegion, ContainerError> {
        let bytes = self.read_memory(offset, len)?;
        Ok(MemoryRegion { offset, bytes })
    }

    /// Write a previously externalized region back at its recorded offset.
    pub fn internalize_memory(&mut self, region: &MemoryRegion) -> Result<(), ContainerError> {
        self.write_memory(region.offset, &region.bytes)
    }

    /// Read a slot range from the table.
    pub fn read_table(&mut self, index: u64, len: u64) -> Result<Vec<TableSlot>, ContainerError> {
        let table = self.handle.table()?;
        let size = table.size(self.handle.store());
        if index.checked_add(len).map_or(true, |end| end > size) {
            return Err(BoundsError::Table { index, len, size }.into());
        }
        let mut entries = Vec::with_capacity(len as usize);
        for slot in index..index + len {
            match table.get(self.handle.store_mut(), slot) {
                Some(Ref::Func(entry)) => entries.push(TableSlot(entry)),
                Some(_) => {
                    return Err(ContainerError::InvalidInvocation(format!(
                        "table slot {slot} does not hold a function entry"
                    )));
                }
                None => return Err(BoundsError::Table { index, len, size }.into()),
            }
        }
        Ok(entries)
    }

    /// Write entries into the table starting at `index`.
    pub fn write_table(&mut self, index: u64, entries: &[TableSlot]) -> Result<(), ContainerError> {
        let table = self.handle.table()?;
        let size = table.size(self.handle.store());
        let len = entries.len() as u64;
        if index.checked_add(len).map_or(true, |end| end > size) {
            return Err(BoundsError::Table { index, len, size }.into());
        }
        for (i, entry) in entries.iter().enumerate() {
            table
                .set(self.handle.store_mut(), index + i as u64, Ref::Func(entry.0))
                .map_err(|e| ContainerError::Engine(e.to_string()))?;
        }
        Ok(())
    }

    /// Copy a slot range out as an independent region.
    pub fn externalize_table(
        &mut self,
        index: u64,
        len: u64,
    ) -> Result<TableRegion, ContainerError> {
        let entries = self.read_table(index, len)?;
        Ok(TableRegion {
            offset: index,
            entries,
        })
    }

    /// Write a previously externalized region back at its recorded offset.
    pub fn internalize_table(&mut self, region: &TableRegion) -> Result<(), ContainerError> {
        self.write_table(region.offset, &region.entries)
    }

    /// Read a named global.
    pub fn read_global(&mut self, name: &str) -> Result<WasmValue, ContainerError> {
        let global = self.handle.global(name)?;
        let val = global.get(self.handle.store_mut());
        WasmValue::from_val(&val).ok_or_else(|| {
            ContainerError::InvalidInvocation(format!(
                "global {name:?} holds a type the container does not carry"
            ))
        })
    }

    /// Write a named global. The global must be mutable and the value must
    /// match its declared type.
    pub fn write_global(&mut self, name: &str, value: &WasmValue) -> Result<(), ContainerError> {
        let global = self.handle.global(name)?;
        let ty = global.ty(self.handle.store());
        if ty.mutability() != Mutability::Var {
            return Err(ContainerError::InvalidInvocation(format!(
                "global {name:?} is immutable"
            )));
        }
        if !value.matches(ty.content()) {
            return Err(ContainerError::InvalidInvocation(format!(
                "global {name:?} type mismatch"
            )));
        }
        let val = match value {
            WasmValue::I32(v) => Val::I32(*v),
            WasmValue::I64(v) => Val::I64(*v),
            WasmValue::F32(bits) => Val::F32(*bits),
            WasmValue::F64(bits) => Val::F64(*bits),
            WasmValue::Ref(_) => {
                return Err(ContainerError::InvalidInvocation(format!(
                    "global {name:?}: function-reference globals are not writable through the accessor"
                )));
            }
        };
        global
            .set(self.handle.store_mut(), val)
            .map_err(|e| ContainerError::Engine(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::accessor::{MemoryRegion, TableRegion, TableSlot};

    #[test]
    fn memory_region_is_an_independent_copy() {
        let region = MemoryRegion {
            offset: 5,
            bytes: b"test".to_vec(),
        };
        let snapshot = region.clone();
        assert_eq!(snapshot, region);
        assert_eq!(region.len(), 4);
    }

    #[test]
    fn table_region_null_mask() {
        let region = TableRegion {
            offset: 0,
            entries: vec![TableSlot(None), TableSlot(None)],
        };
        assert_eq!(region.null_mask(), vec![true, true]);
        assert_eq!(region.len(), 2);
    }
}
