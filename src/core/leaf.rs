//! Purpose: Per-name, per-type column accessor and its borrowed front door.
//! Exports: `Leaf`, `LeafMut`.
//! Role: Owns one type-erased buffer plus the deferred binder that ties it to a store column.
//! Invariants: The buffer kind is fixed by the first `read`/`write`; later calls must agree.
//! Invariants: A leaf whose column cannot be resolved stays inert and is never an error.
use tracing::error;

use crate::core::binder::Binder;
use crate::core::cell::{Cell, Mode};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::{ColumnHandle, Store};
use crate::core::value::{ColumnType, Value, ValueKind};

#[derive(Debug)]
pub struct Leaf {
    name: String,
    cell: Cell,
    handle: Option<ColumnHandle>,
    binder: Option<Binder>,
}

impl Leaf {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cell: Cell::new(),
            handle: None,
            binder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store-side handle; `None` until a binder resolved the column.
    pub fn handle(&self) -> Option<ColumnHandle> {
        self.handle
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.cell.kind()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.cell.mode()
    }

    pub fn value(&self) -> Option<&Value> {
        self.cell.value()
    }

    /// Typed view of the current buffer without registering anything.
    pub fn get<T: ColumnType>(&self) -> Result<&T, Error> {
        self.cell
            .get::<T>()
            .map_err(|err| err.with_column(&self.name))
    }

    pub(crate) fn length(&self) -> Option<usize> {
        self.cell.value().and_then(Value::as_len)
    }

    pub(crate) fn buffer_mut(&mut self) -> Option<&mut Value> {
        self.cell.value_mut()
    }

    /// (Re)binds against `store` if a binder was queued.
    pub(crate) fn init(&mut self, store: &mut dyn Store) {
        if let Some(binder) = &self.binder {
            self.handle = binder.bind(&self.name, store);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.cell.reset();
    }

    pub(crate) fn fetch(
        &mut self,
        store: &mut dyn Store,
        local_index: u64,
    ) -> Result<usize, Error> {
        let (Some(handle), Some(buffer)) = (self.handle, self.cell.value_mut()) else {
            return Ok(0);
        };
        store
            .fetch_column(handle, local_index, buffer)
            .map_err(|err| err.with_column(&self.name))
    }

    fn materialize(
        &mut self,
        kind: ValueKind,
        mode: Mode,
        store: Option<&mut dyn Store>,
    ) -> Result<bool, Error> {
        let fresh = self
            .cell
            .materialize(kind, mode)
            .map_err(|err| err.with_column(&self.name))?;
        if !fresh {
            return Ok(false);
        }
        let binder = match mode {
            Mode::Write => Binder::Create { kind },
            Mode::Read => Binder::Attach { kind },
        };
        if let Some(store) = store {
            self.handle = binder.bind(&self.name, store);
        }
        self.binder = Some(binder);
        Ok(true)
    }
}

/// A leaf borrowed from its `TreeWrapper`, together with the store context it needs.
pub struct LeafMut<'a, 's> {
    pub(crate) leaf: &'a mut Leaf,
    pub(crate) store: Option<&'a mut (dyn Store + 's)>,
    pub(crate) entry: Option<u64>,
}

impl<'a, 's> LeafMut<'a, 's> {
    pub fn name(&self) -> &str {
        &self.leaf.name
    }

    pub fn handle(&self) -> Option<ColumnHandle> {
        self.leaf.handle
    }

    /// Write handle. The first call creates the column, now or when a store is attached.
    pub fn write<T: ColumnType>(self) -> Result<&'a mut T, Error> {
        let leaf = self.leaf;
        leaf.materialize(T::KIND, Mode::Write, self.store.map(|s| s as &mut dyn Store))?;
        leaf.cell
            .get_mut::<T>()
            .map_err(|err| err.with_column(&leaf.name))
    }

    /// Read handle. The first call attaches to the stored column and, if a record was
    /// already read, catches the new buffer up to it.
    pub fn read<T: ColumnType>(self) -> Result<&'a T, Error> {
        let leaf = self.read_as(T::KIND)?;
        leaf.get::<T>()
    }

    /// Runtime-typed variant of `read`.
    pub fn read_value(self, kind: ValueKind) -> Result<&'a Value, Error> {
        let leaf = self.read_as(kind)?;
        leaf.cell
            .value()
            .ok_or_else(|| Error::new(ErrorKind::Internal).with_column(&leaf.name))
    }

    /// Runtime-typed write: replaces the buffer with `value`, creating the column on first use.
    pub fn assign(self, value: Value) -> Result<(), Error> {
        let leaf = self.leaf;
        leaf.materialize(value.kind(), Mode::Write, self.store.map(|s| s as &mut dyn Store))?;
        if let Some(buffer) = leaf.cell.value_mut() {
            *buffer = value;
        }
        Ok(())
    }

    fn read_as(self, kind: ValueKind) -> Result<&'a Leaf, Error> {
        let leaf = self.leaf;
        let mut store = self.store;
        let target = store.as_deref_mut().map(|s| s as &mut dyn Store);
        let fresh = leaf.materialize(kind, Mode::Read, target)?;
        if fresh && let (Some(entry), Some(store)) = (self.entry, store) {
            catch_up(leaf, store, entry)?;
        }
        Ok(&*leaf)
    }
}

fn catch_up(leaf: &mut Leaf, store: &mut dyn Store, entry: u64) -> Result<(), Error> {
    if leaf.handle.is_none() {
        return Ok(());
    }
    let local = if store.is_chained() {
        store.resolve_segment(entry)?
    } else {
        entry
    };
    leaf.fetch(store, local).map_err(|err| {
        error!(column = %leaf.name, entry, error = %err, "catch-up fetch failed");
        err.with_entry(entry)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Leaf, LeafMut};
    use crate::core::cell::Mode;
    use crate::core::error::ErrorKind;
    use crate::core::memory::MemoryStore;
    use crate::core::store::Store;
    use crate::core::value::Value;

    fn unattached(leaf: &mut Leaf) -> LeafMut<'_, 'static> {
        LeafMut {
            leaf,
            store: None,
            entry: None,
        }
    }

    #[test]
    fn write_without_store_defers_creation() {
        let mut leaf = Leaf::new("x");
        *unattached(&mut leaf).write::<i32>().expect("write") = 5;
        assert_eq!(leaf.handle(), None);
        assert_eq!(leaf.mode(), Some(Mode::Write));

        let mut store = MemoryStore::new();
        leaf.init(&mut store);
        let handle = leaf.handle().expect("bound");
        assert_eq!(store.locate_column("x"), Some(handle));
    }

    #[test]
    fn read_with_store_binds_and_catches_up() {
        let mut store = MemoryStore::new()
            .with_column("x", vec![5i32, 7])
            .expect("x");
        let mut leaf = Leaf::new("x");
        let value = LeafMut {
            leaf: &mut leaf,
            store: Some(&mut store),
            entry: Some(1),
        }
        .read::<i32>()
        .expect("read");
        assert_eq!(*value, 7);
        assert!(store.status(leaf.handle().expect("bound")));
    }

    #[test]
    fn write_and_assign_with_store_create_columns() {
        let mut store = MemoryStore::new();
        let mut x = Leaf::new("x");
        *LeafMut {
            leaf: &mut x,
            store: Some(&mut store),
            entry: None,
        }
        .write::<u32>()
        .expect("write") = 4;
        let mut label = Leaf::new("label");
        LeafMut {
            leaf: &mut label,
            store: Some(&mut store),
            entry: None,
        }
        .assign(Value::Str("a".to_string()))
        .expect("assign");

        assert_eq!(store.locate_column("x"), x.handle());
        assert_eq!(store.locate_column("label"), label.handle());
        assert!(x.handle().is_some() && label.handle().is_some());
    }

    #[test]
    fn repeated_access_with_other_type_is_rejected() {
        let mut leaf = Leaf::new("x");
        unattached(&mut leaf).write::<f32>().expect("write");
        let err = unattached(&mut leaf).write::<f64>().expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.column(), Some("x"));
    }

    #[test]
    fn reset_restores_default_after_write() {
        let mut leaf = Leaf::new("tracks");
        unattached(&mut leaf)
            .write::<Vec<u32>>()
            .expect("write")
            .extend([1, 2]);
        leaf.reset();
        assert_eq!(leaf.value(), Some(&Value::VecU32(Vec::new())));
    }

    #[test]
    fn assign_checks_kind_of_existing_buffer() {
        let mut leaf = Leaf::new("x");
        unattached(&mut leaf).assign(Value::I64(3)).expect("assign");
        assert_eq!(leaf.get::<i64>().expect("get"), &3);
        let err = unattached(&mut leaf)
            .assign(Value::Str("three".to_string()))
            .expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
