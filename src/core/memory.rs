//! Purpose: In-memory single-segment implementation of the `Store` contract.
//! Exports: `MemoryStore`.
//! Role: Backing store for tests and the CLI; persisted as a JSON document.
//! Invariants: Every column holds exactly `record_count()` entries.
//! Invariants: Columns start fetch-disabled; disabled columns are skipped by fetches.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Binding, ColumnDesc, ColumnHandle, Store};
use crate::core::value::{ColumnType, Value, ValueKind};

#[derive(Clone, Debug)]
struct MemoryColumn {
    desc: ColumnDesc,
    entries: Vec<Value>,
    enabled: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    columns: Vec<MemoryColumn>,
    by_name: HashMap<String, usize>,
    records: u64,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    columns: Vec<ColumnFile>,
}

#[derive(Serialize, Deserialize)]
struct ColumnFile {
    name: String,
    kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<String>,
    entries: Vec<serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a populated column. The first column fixes the record count.
    pub fn with_column<T: ColumnType>(
        mut self,
        name: &str,
        entries: impl IntoIterator<Item = T>,
    ) -> Result<Self, Error> {
        let entries = entries.into_iter().map(ColumnType::into_value).collect();
        self.insert_column(ColumnDesc::new(name, T::KIND), entries)?;
        Ok(self)
    }

    /// Adds a populated array column whose per-record length is governed by `count_column`.
    pub fn with_array_column<C: ColumnType>(
        mut self,
        name: &str,
        count_column: &str,
        entries: impl IntoIterator<Item = C>,
    ) -> Result<Self, Error> {
        if !C::KIND.is_array() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{} is not an array kind", C::KIND))
                .with_column(name));
        }
        let mut desc = ColumnDesc::new(name, C::KIND);
        desc.count_column = Some(count_column.to_string());
        let entries = entries.into_iter().map(ColumnType::into_value).collect();
        self.insert_column(desc, entries)?;
        Ok(self)
    }

    /// Records `child` as a sub-column of `parent`.
    pub fn nest(&mut self, parent: &str, child: &str) -> Result<(), Error> {
        let child = self.index_of(child)?;
        let parent = self.index_of(parent)?;
        self.columns[parent]
            .desc
            .children
            .push(ColumnHandle::new(child as u32));
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.columns.iter().map(|column| &column.desc)
    }

    pub fn values(&self, name: &str) -> Option<&[Value]> {
        let index = *self.by_name.get(name)?;
        Some(self.columns[index].entries.as_slice())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to read store file")
                .with_path(path)
                .with_source(err)
        })?;
        let file: StoreFile = serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("store file is not valid JSON")
                .with_path(path)
                .with_source(err)
        })?;
        Self::from_file(file).map_err(|err| err.with_path(path))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.to_file()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode store file")
                .with_source(err)
        })?;
        fs::write(path, text).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to write store file")
                .with_path(path)
                .with_source(err)
        })
    }

    fn from_file(file: StoreFile) -> Result<Self, Error> {
        let mut store = Self::new();
        let mut nesting = Vec::new();
        for column in file.columns {
            let entries = column
                .entries
                .iter()
                .map(|json| Value::from_json(column.kind, json))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| err.with_column(&column.name))?;
            let mut desc = ColumnDesc::new(&column.name, column.kind);
            desc.count_column = column.count_column;
            store.insert_column(desc, entries).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("inconsistent column in store file")
                    .with_column(&column.name)
                    .with_source(err)
            })?;
            for child in column.children {
                nesting.push((column.name.clone(), child));
            }
        }
        for (parent, child) in nesting {
            store.nest(&parent, &child).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("sub-column refers to an unknown column")
                    .with_column(&child)
                    .with_source(err)
            })?;
        }
        Ok(store)
    }

    fn to_file(&self) -> StoreFile {
        let columns = self
            .columns
            .iter()
            .map(|column| ColumnFile {
                name: column.desc.name.clone(),
                kind: column.desc.kind,
                count_column: column.desc.count_column.clone(),
                children: column
                    .desc
                    .children
                    .iter()
                    .map(|child| self.columns[child.index() as usize].desc.name.clone())
                    .collect(),
                entries: column.entries.iter().map(Value::to_json).collect(),
            })
            .collect();
        StoreFile { columns }
    }

    fn insert_column(
        &mut self,
        desc: ColumnDesc,
        entries: Vec<Value>,
    ) -> Result<ColumnHandle, Error> {
        if self.by_name.contains_key(&desc.name) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message("column already exists")
                .with_column(&desc.name));
        }
        if self.columns.is_empty() {
            self.records = entries.len() as u64;
        } else if entries.len() as u64 != self.records {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "column has {} entries but the store has {} records",
                    entries.len(),
                    self.records
                ))
                .with_column(&desc.name));
        }
        let index = self.columns.len();
        self.by_name.insert(desc.name.clone(), index);
        self.columns.push(MemoryColumn {
            desc,
            entries,
            enabled: false,
        });
        Ok(ColumnHandle::new(index as u32))
    }

    fn index_of(&self, name: &str) -> Result<usize, Error> {
        self.by_name.get(name).copied().ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("no such column")
                .with_column(name)
        })
    }

    fn column(&self, handle: ColumnHandle) -> Result<&MemoryColumn, Error> {
        self.columns.get(handle.index() as usize).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("unknown column handle {}", handle.index()))
        })
    }

    pub(crate) fn read_entry(
        &self,
        handle: ColumnHandle,
        index: u64,
        buffer: &mut Value,
    ) -> Result<usize, Error> {
        let column = self.column(handle)?;
        if !column.enabled {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("column is not enabled for fetch")
                .with_column(&column.desc.name));
        }
        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| column.entries.get(index))
            .ok_or_else(|| out_of_range(index, self.records))?;
        buffer.clone_from(entry);
        Ok(entry.byte_size())
    }
}

impl Store for MemoryStore {
    fn create_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnHandle, Error> {
        let entries = (0..self.records).map(|_| Value::default_of(kind)).collect();
        let records = self.records;
        let handle = self.insert_column(ColumnDesc::new(name, kind), entries)?;
        self.records = records;
        Ok(handle)
    }

    fn locate_column(&self, name: &str) -> Option<ColumnHandle> {
        self.by_name
            .get(name)
            .map(|index| ColumnHandle::new(*index as u32))
    }

    fn describe(&self, handle: ColumnHandle) -> Option<&ColumnDesc> {
        self.columns
            .get(handle.index() as usize)
            .map(|column| &column.desc)
    }

    fn set_status(&mut self, handle: ColumnHandle, enabled: bool) {
        if let Some(column) = self.columns.get_mut(handle.index() as usize) {
            column.enabled = enabled;
        }
    }

    fn status(&self, handle: ColumnHandle) -> bool {
        self.columns
            .get(handle.index() as usize)
            .is_some_and(|column| column.enabled)
    }

    fn fetch_record(&mut self, index: u64, bindings: &mut [Binding<'_>]) -> Result<usize, Error> {
        if index >= self.records {
            return Err(out_of_range(index, self.records));
        }
        let mut bytes = 0;
        for (position, column) in self.columns.iter().enumerate() {
            if !column.enabled {
                continue;
            }
            let entry = &column.entries[index as usize];
            let handle = ColumnHandle::new(position as u32);
            for binding in bindings.iter_mut().filter(|binding| binding.handle == handle) {
                binding.buffer.clone_from(entry);
            }
            bytes += entry.byte_size();
        }
        Ok(bytes)
    }

    fn fetch_column(
        &mut self,
        handle: ColumnHandle,
        local_index: u64,
        buffer: &mut Value,
    ) -> Result<usize, Error> {
        self.read_entry(handle, local_index, buffer)
    }

    fn commit_record(&mut self, values: &[(ColumnHandle, &Value)]) -> Result<(), Error> {
        for (handle, value) in values {
            let column = self.column(*handle)?;
            if column.desc.kind != value.kind() {
                return Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "column holds {} but {} was committed",
                        column.desc.kind,
                        value.kind()
                    ))
                    .with_column(&column.desc.name));
            }
        }
        for (position, column) in self.columns.iter_mut().enumerate() {
            let handle = ColumnHandle::new(position as u32);
            let value = values
                .iter()
                .find(|(candidate, _)| *candidate == handle)
                .map(|(_, value)| (*value).clone())
                .unwrap_or_else(|| Value::default_of(column.desc.kind));
            column.entries.push(value);
        }
        self.records += 1;
        Ok(())
    }

    fn record_count(&self) -> u64 {
        self.records
    }
}

pub(crate) fn out_of_range(index: u64, records: u64) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(format!("entry out of range (store has {records} records)"))
        .with_entry(index)
}

fn io_error_kind(err: &std::io::Error) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::core::error::ErrorKind;
    use crate::core::store::{Binding, Store};
    use crate::core::value::{Value, ValueKind};

    fn sample() -> MemoryStore {
        MemoryStore::new()
            .with_column("n", vec![2u32, 0])
            .expect("n")
            .with_array_column("a", "n", vec![vec![1.5f64, 2.5], vec![]])
            .expect("a")
    }

    #[test]
    fn columns_must_agree_on_record_count() {
        let err = MemoryStore::new()
            .with_column("x", vec![1i32, 2])
            .expect("x")
            .with_column("y", vec![1i32])
            .expect_err("length mismatch");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn disabled_columns_are_not_fetched() {
        let mut store = sample();
        let n = store.locate_column("n").expect("n");
        let mut buffer = Value::U32(0);
        let err = store.fetch_column(n, 0, &mut buffer).expect_err("disabled");
        assert_eq!(err.kind(), ErrorKind::Usage);

        store.set_status(n, true);
        store.fetch_column(n, 0, &mut buffer).expect("fetch");
        assert_eq!(buffer, Value::U32(2));
    }

    #[test]
    fn whole_record_fetch_fills_enabled_bindings() {
        let mut store = sample();
        let n = store.locate_column("n").expect("n");
        let a = store.locate_column("a").expect("a");
        store.set_status(a, true);

        let mut n_buf = Value::U32(9);
        let mut a_buf = Value::VecF64(Vec::new());
        let mut bindings = [
            Binding {
                handle: n,
                buffer: &mut n_buf,
            },
            Binding {
                handle: a,
                buffer: &mut a_buf,
            },
        ];
        let bytes = store.fetch_record(0, &mut bindings).expect("fetch");
        assert_eq!(bytes, 16);
        assert_eq!(n_buf, Value::U32(9));
        assert_eq!(a_buf, Value::VecF64(vec![1.5, 2.5]));

        let err = store.fetch_record(2, &mut []).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn commit_appends_defaults_for_missing_values() {
        let mut store = sample();
        let n = store.locate_column("n").expect("n");
        store
            .commit_record(&[(n, &Value::U32(1))])
            .expect("commit");
        assert_eq!(store.record_count(), 3);
        assert_eq!(store.values("a").expect("a")[2], Value::VecF64(Vec::new()));

        let err = store
            .commit_record(&[(n, &Value::I32(1))])
            .expect_err("kind mismatch");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(store.record_count(), 3);
    }

    #[test]
    fn created_columns_are_backfilled() {
        let mut store = sample();
        let handle = store.create_column("w", ValueKind::F32).expect("create");
        assert_eq!(store.values("w").expect("w"), &[Value::F32(0.0), Value::F32(0.0)]);
        assert!(!store.status(handle));
        let err = store.create_column("w", ValueKind::F32).expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn save_and_load_preserve_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.json");
        let mut store = sample();
        store.nest("n", "a").expect("nest");
        store.save(&path).expect("save");

        let loaded = MemoryStore::load(&path).expect("load");
        assert_eq!(loaded.record_count(), 2);
        let a = loaded.locate_column("a").expect("a");
        let desc = loaded.describe(a).expect("desc");
        assert_eq!(desc.count_column.as_deref(), Some("n"));
        let n = loaded.locate_column("n").expect("n");
        assert_eq!(loaded.describe(n).expect("desc").children, vec![a]);
        assert_eq!(loaded.values("a").expect("a")[0], Value::VecF64(vec![1.5, 2.5]));
    }

    #[test]
    fn load_rejects_ragged_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ragged.json");
        std::fs::write(
            &path,
            r#"{"columns":[{"name":"x","kind":"i32","entries":[1,2]},{"name":"y","kind":"i32","entries":[1]}]}"#,
        )
        .expect("write");
        let err = MemoryStore::load(&path).expect_err("ragged");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.column(), Some("y"));
    }
}
