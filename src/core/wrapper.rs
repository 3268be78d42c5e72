//! Purpose: Drive per-record fetch and commit over a registry of named column accessors.
//! Exports: `TreeWrapper`.
//! Role: Owns leaves and array groups; mediates attachment to a borrowed store.
//! Invariants: `entry()` is the last record read into the buffers, or -1 before any.
//! Invariants: A failed fetch leaves the entry index where it was.
//! Invariants: Unresolved accessors are pruned once, on the first fetch after attachment.
use std::collections::HashMap;

use tracing::{debug, error};

use crate::core::cell::Mode;
use crate::core::error::{Error, ErrorKind};
use crate::core::leaf::{Leaf, LeafMut};
use crate::core::store::{Binding, ColumnHandle, Store};
use crate::core::value::{LengthType, Value, ValueKind};
use crate::core::varr::{VarrGroup, VarrGroupMut};

/// One engine owns its store borrow; concurrent engines over one store cannot be built.
pub struct TreeWrapper<'s> {
    store: Option<&'s mut (dyn Store + 's)>,
    current: Option<u64>,
    next: u64,
    stop_at: Option<u64>,
    pruned: bool,
    leaves: HashMap<String, Leaf>,
    groups: HashMap<String, VarrGroup>,
}

impl Default for TreeWrapper<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> TreeWrapper<'s> {
    /// An engine with no store yet; write accessors queue their columns until `init`.
    pub fn new() -> Self {
        Self {
            store: None,
            current: None,
            next: 0,
            stop_at: None,
            pruned: false,
            leaves: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    pub fn with_store(store: &'s mut (dyn Store + 's)) -> Self {
        let mut wrapper = Self::new();
        wrapper.init(store);
        wrapper
    }

    /// Attaches (or re-attaches) a store and re-binds every registered accessor against it.
    pub fn init(&mut self, store: &'s mut (dyn Store + 's)) {
        for leaf in self.leaves.values_mut() {
            leaf.init(store);
        }
        for group in self.groups.values_mut() {
            group.init(store);
        }
        debug!(
            leaves = self.leaves.len(),
            groups = self.groups.len(),
            records = store.record_count(),
            "attached store"
        );
        self.store = Some(store);
        self.current = None;
        self.next = 0;
        self.pruned = false;
    }

    /// Releases the store borrow, leaving the engine unattached.
    pub fn detach(&mut self) -> Option<&'s mut (dyn Store + 's)> {
        self.current = None;
        self.next = 0;
        self.store.take()
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    pub fn entries(&self) -> u64 {
        self.store.as_ref().map_or(0, |store| store.record_count())
    }

    pub fn entry(&self) -> i64 {
        self.current
            .and_then(|entry| i64::try_from(entry).ok())
            .unwrap_or(-1)
    }

    pub fn rewind(&mut self) {
        self.current = None;
        self.next = 0;
    }

    /// Positions the cursor so the next `advance` reads `entry`, clamped to the bound.
    pub fn set_entry(&mut self, entry: u64) {
        let bound = self.stop_bound();
        self.next = if bound == 0 { 0 } else { entry.min(bound - 1) };
    }

    /// Makes `entry` the last record `advance` will read.
    pub fn stop_at(&mut self, entry: u64) {
        let records = self.entries();
        self.stop_at = Some(if entry >= records { records } else { entry + 1 });
    }

    pub fn clear_stop_at(&mut self) {
        self.stop_at = None;
    }

    fn stop_bound(&self) -> u64 {
        let records = self.entries();
        self.stop_at.map_or(records, |stop| stop.min(records))
    }

    /// Reads the next record with per-column fetches. `Ok(false)` once the bound is reached.
    pub fn advance(&mut self) -> Result<bool, Error> {
        self.advance_with(false)
    }

    pub fn advance_with(&mut self, read_all: bool) -> Result<bool, Error> {
        if self.next >= self.stop_bound() {
            return Ok(false);
        }
        self.fetch_entry(self.next, read_all)?;
        Ok(true)
    }

    /// Fills every registered buffer with record `index`.
    ///
    /// With `read_all`, one whole-record fetch covers every enabled column; otherwise each
    /// bound read accessor is fetched on its own. Array groups are sized afterwards.
    pub fn fetch_entry(&mut self, index: u64, read_all: bool) -> Result<(), Error> {
        if self.store.is_none() {
            return Err(unattached());
        }
        if !self.pruned {
            self.prune();
        }
        let store = self.store.as_deref_mut().ok_or_else(unattached)?;

        let local = if read_all {
            let mut bindings: Vec<Binding<'_>> = self
                .leaves
                .values_mut()
                .filter(|leaf| leaf.mode() == Some(Mode::Read))
                .filter_map(|leaf| {
                    let handle = leaf.handle()?;
                    Some(Binding {
                        handle,
                        buffer: leaf.buffer_mut()?,
                    })
                })
                .collect();
            for group in self.groups.values_mut() {
                bindings.extend(group.bindings());
            }
            store.fetch_record(index, &mut bindings).map_err(|err| {
                error!(entry = index, error = %err, "whole-record fetch failed");
                err.with_entry(index)
            })?;
            index
        } else {
            let local = if store.is_chained() {
                store.resolve_segment(index).map_err(|err| {
                    error!(entry = index, error = %err, "segment resolution failed");
                    err.with_entry(index)
                })?
            } else {
                index
            };
            for leaf in self.leaves.values_mut() {
                if leaf.mode() != Some(Mode::Read) {
                    continue;
                }
                leaf.fetch(store, local).map_err(|err| {
                    error!(
                        column = leaf.name(),
                        entry = index,
                        error = %err,
                        "column fetch failed"
                    );
                    err.with_entry(index)
                })?;
            }
            local
        };

        for (length_column, group) in self.groups.iter_mut() {
            let length_leaf = self
                .leaves
                .get_mut(length_column)
                .filter(|leaf| leaf.handle().is_some());
            group
                .get_entry(length_leaf, store, local, read_all)
                .map_err(|err| {
                    error!(
                        length_column = %length_column,
                        entry = index,
                        error = %err,
                        "array fetch failed"
                    );
                    err.with_entry(index)
                })?;
        }

        self.current = Some(index);
        self.next = index + 1;
        Ok(())
    }

    fn prune(&mut self) {
        let before = self.leaves.len();
        self.leaves.retain(|name, leaf| {
            let keep = leaf.handle().is_some();
            if !keep {
                debug!(column = %name, "pruning unresolved column");
            }
            keep
        });
        let dropped_arrays: usize = self.groups.values_mut().map(VarrGroup::prune).sum();
        debug!(
            dropped = before - self.leaves.len(),
            dropped_arrays, "pruned unresolved accessors"
        );
        self.pruned = true;
    }

    /// Looks up or creates the accessor for `name`.
    pub fn leaf(&mut self, name: &str) -> LeafMut<'_, 's> {
        let leaf = self
            .leaves
            .entry(name.to_string())
            .or_insert_with(|| Leaf::new(name));
        LeafMut {
            leaf,
            store: self.store.as_deref_mut(),
            entry: self.current,
        }
    }

    /// Read-only view of a registered accessor.
    pub fn get_leaf(&self, name: &str) -> Option<&Leaf> {
        self.leaves.get(name)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Looks up or creates the array group governed by `length_column`, which is
    /// registered as a read accessor of type `S`.
    pub fn group<S: LengthType>(
        &mut self,
        length_column: &str,
    ) -> Result<VarrGroupMut<'_, 's>, Error> {
        self.group_with_kind(length_column, S::KIND)
    }

    /// Runtime-typed variant of `group`.
    pub fn group_with_kind(
        &mut self,
        length_column: &str,
        kind: ValueKind,
    ) -> Result<VarrGroupMut<'_, 's>, Error> {
        if !kind.is_length() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("length columns must be unsigned, not {kind}"))
                .with_column(length_column));
        }
        let length = self
            .leaf(length_column)
            .read_value(kind)?
            .as_len()
            .unwrap_or(0);
        let group = self
            .groups
            .entry(length_column.to_string())
            .or_insert_with(|| VarrGroup::new(length_column));
        Ok(VarrGroupMut {
            group,
            store: self.store.as_deref_mut(),
            entry: self.current,
            length,
        })
    }

    pub fn get_group(&self, length_column: &str) -> Option<&VarrGroup> {
        self.groups.get(length_column)
    }

    /// Commits every bound write accessor as one new record, then optionally resets
    /// all accessors to their defaults.
    pub fn fill(&mut self, auto_reset: bool) -> Result<(), Error> {
        let store = self.store.as_deref_mut().ok_or_else(unattached)?;
        let values: Vec<(ColumnHandle, &Value)> = self
            .leaves
            .values()
            .filter(|leaf| leaf.mode() == Some(Mode::Write))
            .filter_map(|leaf| Some((leaf.handle()?, leaf.value()?)))
            .collect();
        store.commit_record(&values).map_err(|err| {
            error!(error = %err, "commit failed");
            err
        })?;
        debug!(columns = values.len(), records = store.record_count(), "committed record");
        if auto_reset {
            for leaf in self.leaves.values_mut() {
                leaf.reset();
            }
        }
        Ok(())
    }
}

fn unattached() -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("no store attached")
        .with_hint("Attach a store with TreeWrapper::init first.")
}
