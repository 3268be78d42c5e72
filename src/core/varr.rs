//! Purpose: Variable-length array columns grouped by the column that governs their length.
//! Exports: `VarrGroup`, `VarrLeaf`, `VarrGroupMut`, `VarrLeafMut`, `DEFAULT_CAPACITY`.
//! Role: Resolves the per-record length first, then sizes every member buffer to it.
//! Invariants: A member is only bound when the store links it to the group's length column.
//! Invariants: Buffer length after a fetch is `min(governing length, capacity)`.
use std::collections::HashMap;

use tracing::{debug, error};

use crate::core::binder::Binder;
use crate::core::cell::type_mismatch;
use crate::core::error::{Error, ErrorKind};
use crate::core::leaf::Leaf;
use crate::core::store::{Binding, ColumnHandle, Store};
use crate::core::value::{ArrayElement, ColumnType, Value, ValueKind};

/// Capacity used when the caller has no better bound.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct VarrLeaf {
    name: String,
    length_column: String,
    buffer: Option<Value>,
    capacity: usize,
    handle: Option<ColumnHandle>,
    binder: Option<Binder>,
}

impl VarrLeaf {
    fn new(name: &str, length_column: &str) -> Self {
        Self {
            name: name.to_string(),
            length_column: length_column.to_string(),
            buffer: None,
            capacity: 0,
            handle: None,
            binder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<ColumnHandle> {
        self.handle
    }

    /// Fixed by the first read; zero before that.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn value(&self) -> Option<&Value> {
        self.buffer.as_ref()
    }

    pub fn get<T: ArrayElement>(&self) -> Result<&[T], Error> {
        let value = self.buffer.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("array column has not been read yet")
                .with_column(&self.name)
        })?;
        T::Column::peek(value)
            .map(AsRef::as_ref)
            .ok_or_else(|| type_mismatch(T::Column::KIND, value.kind()).with_column(&self.name))
    }

    fn init(&mut self, store: &mut dyn Store) {
        if let Some(binder) = &self.binder {
            self.handle = binder.bind(&self.name, store);
        }
    }

    fn clamp(&mut self, len: usize) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.resize(len.min(self.capacity));
        }
    }

    fn fetch(&mut self, store: &mut dyn Store, local_index: u64) -> Result<usize, Error> {
        let (Some(handle), Some(buffer)) = (self.handle, self.buffer.as_mut()) else {
            return Ok(0);
        };
        store
            .fetch_column(handle, local_index, buffer)
            .map_err(|err| err.with_column(&self.name))
    }

    fn get_entry(
        &mut self,
        store: &mut dyn Store,
        local_index: u64,
        len: usize,
        read_all: bool,
    ) -> Result<(), Error> {
        if !read_all {
            self.fetch(store, local_index)?;
        }
        self.clamp(len);
        Ok(())
    }
}

#[derive(Debug)]
pub struct VarrGroup {
    length_column: String,
    leaves: HashMap<String, VarrLeaf>,
}

impl VarrGroup {
    pub(crate) fn new(length_column: &str) -> Self {
        Self {
            length_column: length_column.to_string(),
            leaves: HashMap::new(),
        }
    }

    pub fn length_column(&self) -> &str {
        &self.length_column
    }

    pub fn has(&self, name: &str) -> bool {
        self.leaves.contains_key(name)
    }

    pub fn leaf(&self, name: &str) -> Option<&VarrLeaf> {
        self.leaves.get(name)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub(crate) fn init(&mut self, store: &mut dyn Store) {
        for leaf in self.leaves.values_mut() {
            leaf.init(store);
        }
    }

    /// Drops members whose column never resolved. Returns how many were dropped.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.leaves.len();
        self.leaves.retain(|name, leaf| {
            let keep = leaf.handle.is_some();
            if !keep {
                debug!(
                    column = %name,
                    length_column = %self.length_column,
                    "pruning unresolved array column"
                );
            }
            keep
        });
        before - self.leaves.len()
    }

    pub(crate) fn bindings(&mut self) -> impl Iterator<Item = Binding<'_>> {
        self.leaves.values_mut().filter_map(|leaf| {
            Some(Binding {
                handle: leaf.handle?,
                buffer: leaf.buffer.as_mut()?,
            })
        })
    }

    /// Reads the governing length (unless a whole-record fetch already did), then sizes
    /// and fills every member for the record at `local_index`.
    pub(crate) fn get_entry(
        &mut self,
        length_leaf: Option<&mut Leaf>,
        store: &mut dyn Store,
        local_index: u64,
        read_all: bool,
    ) -> Result<(), Error> {
        let len = match length_leaf {
            Some(leaf) => {
                if !read_all {
                    leaf.fetch(store, local_index)?;
                }
                leaf.length().unwrap_or(0)
            }
            None => 0,
        };
        for leaf in self.leaves.values_mut() {
            leaf.get_entry(store, local_index, len, read_all)?;
        }
        Ok(())
    }
}

/// A group borrowed from its `TreeWrapper` with the context its members need to bind.
pub struct VarrGroupMut<'a, 's> {
    pub(crate) group: &'a mut VarrGroup,
    pub(crate) store: Option<&'a mut (dyn Store + 's)>,
    pub(crate) entry: Option<u64>,
    pub(crate) length: usize,
}

impl<'a, 's> VarrGroupMut<'a, 's> {
    pub fn length_column(&self) -> &str {
        &self.group.length_column
    }

    /// Current value of the governing column.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn has(&self, name: &str) -> bool {
        self.group.has(name)
    }

    /// Looks up or creates the member called `name`.
    pub fn leaf(self, name: &str) -> VarrLeafMut<'a, 's> {
        let group = self.group;
        let length_column = &group.length_column;
        let leaf = group
            .leaves
            .entry(name.to_string())
            .or_insert_with(|| VarrLeaf::new(name, length_column));
        VarrLeafMut {
            leaf,
            store: self.store,
            entry: self.entry,
            length: self.length,
        }
    }
}

pub struct VarrLeafMut<'a, 's> {
    leaf: &'a mut VarrLeaf,
    store: Option<&'a mut (dyn Store + 's)>,
    entry: Option<u64>,
    length: usize,
}

impl<'a, 's> VarrLeafMut<'a, 's> {
    pub fn name(&self) -> &str {
        &self.leaf.name
    }

    /// Read handle. The first call fixes the buffer capacity to `maxsize` and attaches to
    /// the stored column, checking its count-column linkage.
    pub fn read<T: ArrayElement>(self, maxsize: usize) -> Result<&'a [T], Error> {
        let leaf = self.read_as(T::Column::KIND, maxsize)?;
        leaf.get::<T>()
    }

    pub fn read_value(self, kind: ValueKind, maxsize: usize) -> Result<&'a Value, Error> {
        let leaf = self.read_as(kind, maxsize)?;
        leaf.buffer
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::Internal).with_column(&leaf.name))
    }

    fn read_as(self, kind: ValueKind, maxsize: usize) -> Result<&'a VarrLeaf, Error> {
        let leaf = self.leaf;
        if !kind.is_array() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{kind} is not an array kind"))
                .with_column(&leaf.name));
        }
        match &leaf.buffer {
            Some(buffer) if buffer.kind() == kind => return Ok(&*leaf),
            Some(buffer) => {
                return Err(type_mismatch(kind, buffer.kind()).with_column(&leaf.name));
            }
            None => {}
        }

        leaf.buffer = Some(Value::default_of(kind));
        leaf.capacity = maxsize;
        let binder = Binder::AttachArray {
            kind,
            length_column: leaf.length_column.clone(),
        };
        if let Some(store) = self.store {
            leaf.handle = binder.bind(&leaf.name, store);
            if let (Some(entry), Some(_)) = (self.entry, leaf.handle) {
                catch_up(leaf, store, entry, self.length)?;
            }
        }
        leaf.binder = Some(binder);
        Ok(&*leaf)
    }
}

fn catch_up(
    leaf: &mut VarrLeaf,
    store: &mut dyn Store,
    entry: u64,
    len: usize,
) -> Result<(), Error> {
    let local = if store.is_chained() {
        store.resolve_segment(entry)?
    } else {
        entry
    };
    leaf.get_entry(store, local, len, false).map_err(|err| {
        error!(column = %leaf.name, entry, error = %err, "catch-up fetch failed");
        err.with_entry(entry)
    })
}

#[cfg(test)]
mod tests {
    use super::{VarrGroup, VarrGroupMut};
    use crate::core::error::ErrorKind;
    use crate::core::memory::MemoryStore;
    use crate::core::store::Store;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_column("n", vec![2u32, 0, 3])
            .expect("n")
            .with_array_column("a", "n", vec![vec![10i32, 11], vec![], vec![20, 21, 22]])
            .expect("a")
    }

    #[test]
    fn catch_up_clamps_to_capacity() {
        let mut store = store();
        let mut group = VarrGroup::new("n");
        let values = VarrGroupMut {
            group: &mut group,
            store: Some(&mut store),
            entry: Some(2),
            length: 3,
        }
        .leaf("a")
        .read::<i32>(2)
        .expect("read");
        assert_eq!(values, &[20, 21]);
        assert_eq!(group.leaf("a").expect("a").capacity(), 2);
    }

    #[test]
    fn get_entry_follows_length_column() {
        let mut store = store();
        let mut group = VarrGroup::new("n");
        VarrGroupMut {
            group: &mut group,
            store: Some(&mut store),
            entry: None,
            length: 0,
        }
        .leaf("a")
        .read::<i32>(10)
        .expect("read");

        let mut length = crate::core::leaf::Leaf::new("n");
        crate::core::leaf::LeafMut {
            leaf: &mut length,
            store: Some(&mut store),
            entry: None,
        }
        .read::<u32>()
        .expect("length");

        let mut seen = Vec::new();
        for index in 0..3 {
            group
                .get_entry(Some(&mut length), &mut store, index, false)
                .expect("entry");
            seen.push(group.leaf("a").expect("a").get::<i32>().expect("get").to_vec());
        }
        assert_eq!(seen, vec![vec![10, 11], vec![], vec![20, 21, 22]]);
    }

    #[test]
    fn mislinked_member_is_pruned() {
        let mut store = store().with_column("m", vec![1u32, 1, 1]).expect("m");
        let mut group = VarrGroup::new("m");
        VarrGroupMut {
            group: &mut group,
            store: Some(&mut store),
            entry: None,
            length: 0,
        }
        .leaf("a")
        .read::<i32>(10)
        .expect("read stays inert");
        assert_eq!(group.leaf("a").expect("a").handle(), None);
        assert_eq!(group.prune(), 1);
        assert!(!group.has("a"));
        let a = store.locate_column("a").expect("a");
        assert!(!store.status(a));
    }

    #[test]
    fn scalar_kinds_are_rejected() {
        let mut group = VarrGroup::new("n");
        let err = VarrGroupMut {
            group: &mut group,
            store: None,
            entry: None,
            length: 0,
        }
        .leaf("a")
        .read_value(crate::core::value::ValueKind::I32, 4)
        .expect_err("scalar");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
