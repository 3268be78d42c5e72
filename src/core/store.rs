//! Purpose: Define the boundary contract with the backing named-column store.
//! Exports: `Store`, `ColumnHandle`, `ColumnDesc`, `Binding`.
//! Role: Everything this crate needs from a store; physical layout stays on the other side.
//! Invariants: Handles are non-owning and only meaningful for the store that issued them.
//! Invariants: Stores write record values into buffers lent for the duration of a call.
use crate::core::error::Error;
use crate::core::value::{Value, ValueKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ColumnHandle(u32);

impl ColumnHandle {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub kind: ValueKind,
    /// Store-side count field governing this column's per-record length.
    pub count_column: Option<String>,
    pub children: Vec<ColumnHandle>,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            count_column: None,
            children: Vec::new(),
        }
    }
}

/// One accessor buffer lent to the store during a whole-record fetch.
#[derive(Debug)]
pub struct Binding<'a> {
    pub handle: ColumnHandle,
    pub buffer: &'a mut Value,
}

/// A sequential store of named, typed columns.
///
/// Columns start fetch-disabled; only enabled columns are populated by fetches.
/// Fetch calls return the number of bytes read.
pub trait Store {
    fn create_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnHandle, Error>;

    fn locate_column(&self, name: &str) -> Option<ColumnHandle>;

    fn describe(&self, handle: ColumnHandle) -> Option<&ColumnDesc>;

    fn set_status(&mut self, handle: ColumnHandle, enabled: bool);

    fn status(&self, handle: ColumnHandle) -> bool;

    /// Whole-record fetch of every enabled column; bound buffers receive their values.
    fn fetch_record(&mut self, index: u64, bindings: &mut [Binding<'_>]) -> Result<usize, Error>;

    fn fetch_column(
        &mut self,
        handle: ColumnHandle,
        local_index: u64,
        buffer: &mut Value,
    ) -> Result<usize, Error>;

    /// Appends one record; columns without a supplied value receive their default.
    fn commit_record(&mut self, values: &[(ColumnHandle, &Value)]) -> Result<(), Error>;

    fn record_count(&self) -> u64;

    fn is_chained(&self) -> bool {
        false
    }

    /// Translates a global record index to an index inside the segment that holds it,
    /// making that segment current for subsequent `fetch_column` calls.
    fn resolve_segment(&mut self, index: u64) -> Result<u64, Error> {
        Ok(index)
    }
}
