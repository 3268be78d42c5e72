// Read-only sequence of memory segments presented as one store.
// Handles come from the first segment and are translated by column name per segment.
use crate::core::error::{Error, ErrorKind};
use crate::core::memory::{MemoryStore, out_of_range};
use crate::core::store::{Binding, ColumnDesc, ColumnHandle, Store};
use crate::core::value::{Value, ValueKind};

#[derive(Debug)]
pub struct Chain {
    segments: Vec<MemoryStore>,
    starts: Vec<u64>,
    current: usize,
}

impl Chain {
    pub fn new(segments: Vec<MemoryStore>) -> Result<Self, Error> {
        if segments.is_empty() {
            return Err(
                Error::new(ErrorKind::Usage).with_message("a chain needs at least one segment")
            );
        }
        let mut starts = Vec::with_capacity(segments.len());
        let mut total = 0;
        for segment in &segments {
            starts.push(total);
            total += segment.record_count();
        }
        Ok(Self {
            segments,
            starts,
            current: 0,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn current_segment(&self) -> usize {
        self.current
    }

    fn translate(&self, handle: ColumnHandle) -> Result<ColumnHandle, Error> {
        let name = &self
            .segments[0]
            .describe(handle)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown column handle {}", handle.index()))
            })?
            .name;
        self.segments[self.current]
            .locate_column(name)
            .ok_or_else(|| {
                Error::new(ErrorKind::SchemaMismatch)
                    .with_message(format!("segment {} has no such column", self.current))
                    .with_column(name)
            })
    }

    fn read_only() -> Error {
        Error::new(ErrorKind::Usage)
            .with_message("chained stores are read-only")
            .with_hint("Write to a single store and chain it afterwards.")
    }
}

impl Store for Chain {
    fn create_column(&mut self, _name: &str, _kind: ValueKind) -> Result<ColumnHandle, Error> {
        Err(Self::read_only())
    }

    fn locate_column(&self, name: &str) -> Option<ColumnHandle> {
        self.segments[0].locate_column(name)
    }

    fn describe(&self, handle: ColumnHandle) -> Option<&ColumnDesc> {
        self.segments[0].describe(handle)
    }

    fn set_status(&mut self, handle: ColumnHandle, enabled: bool) {
        let Some(name) = self.segments[0].describe(handle).map(|desc| desc.name.clone()) else {
            return;
        };
        for segment in &mut self.segments {
            if let Some(local) = segment.locate_column(&name) {
                segment.set_status(local, enabled);
            }
        }
    }

    fn status(&self, handle: ColumnHandle) -> bool {
        self.translate(handle)
            .is_ok_and(|local| self.segments[self.current].status(local))
    }

    fn fetch_record(&mut self, index: u64, bindings: &mut [Binding<'_>]) -> Result<usize, Error> {
        let local_index = self.resolve_segment(index)?;
        let mut translated = Vec::with_capacity(bindings.len());
        for binding in bindings.iter_mut() {
            translated.push(Binding {
                handle: self.translate(binding.handle)?,
                buffer: &mut *binding.buffer,
            });
        }
        self.segments[self.current].fetch_record(local_index, &mut translated)
    }

    fn fetch_column(
        &mut self,
        handle: ColumnHandle,
        local_index: u64,
        buffer: &mut Value,
    ) -> Result<usize, Error> {
        let local = self.translate(handle)?;
        self.segments[self.current].read_entry(local, local_index, buffer)
    }

    fn commit_record(&mut self, _values: &[(ColumnHandle, &Value)]) -> Result<(), Error> {
        Err(Self::read_only())
    }

    fn record_count(&self) -> u64 {
        self.segments.iter().map(MemoryStore::record_count).sum()
    }

    fn is_chained(&self) -> bool {
        true
    }

    fn resolve_segment(&mut self, index: u64) -> Result<u64, Error> {
        let segment = self
            .starts
            .iter()
            .zip(&self.segments)
            .rposition(|(start, segment)| index >= *start && index < start + segment.record_count())
            .ok_or_else(|| out_of_range(index, self.record_count()))?;
        self.current = segment;
        Ok(index - self.starts[segment])
    }
}
