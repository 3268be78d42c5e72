// Type-erased holder for one column's in-memory value.
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ColumnType, Value, ValueKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Read,
    Write,
}

/// The kind and access mode are fixed by the first `materialize` call.
#[derive(Debug, Default)]
pub struct Cell {
    value: Option<Value>,
    mode: Option<Mode>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.value.as_ref().map(Value::kind)
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Allocates a default value of `kind` on first call. Returns whether this call allocated.
    pub fn materialize(&mut self, kind: ValueKind, mode: Mode) -> Result<bool, Error> {
        match &self.value {
            Some(value) if value.kind() == kind => Ok(false),
            Some(value) => Err(type_mismatch(kind, value.kind())),
            None => {
                self.value = Some(Value::default_of(kind));
                self.mode = Some(mode);
                Ok(true)
            }
        }
    }

    pub fn get<T: ColumnType>(&self) -> Result<&T, Error> {
        let value = self.value.as_ref().ok_or_else(unmaterialized)?;
        T::peek(value).ok_or_else(|| type_mismatch(T::KIND, value.kind()))
    }

    pub fn get_mut<T: ColumnType>(&mut self) -> Result<&mut T, Error> {
        let value = self.value.as_mut().ok_or_else(unmaterialized)?;
        let held = value.kind();
        T::peek_mut(value).ok_or_else(|| type_mismatch(T::KIND, held))
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut Value> {
        self.value.as_mut()
    }

    /// Only write-mode cells carry a reset policy; read buffers are left alone.
    pub fn reset(&mut self) {
        if self.mode != Some(Mode::Write) {
            return;
        }
        if let Some(value) = self.value.as_mut() {
            value.reset();
        }
    }
}

pub(crate) fn type_mismatch(requested: ValueKind, held: ValueKind) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("requested {requested} but the column holds {held}"))
        .with_hint("Access a column with the same type on every call.")
}

fn unmaterialized() -> Error {
    Error::new(ErrorKind::Usage).with_message("column has not been read or written yet")
}

#[cfg(test)]
mod tests {
    use super::{Cell, Mode};
    use crate::core::error::ErrorKind;
    use crate::core::value::{Value, ValueKind};

    #[test]
    fn first_materialize_allocates_default() {
        let mut cell = Cell::new();
        assert!(cell.value().is_none());
        assert!(cell.materialize(ValueKind::I32, Mode::Write).expect("materialize"));
        assert!(!cell.materialize(ValueKind::I32, Mode::Write).expect("materialize"));
        assert_eq!(cell.get::<i32>().expect("get"), &0);
        assert_eq!(cell.mode(), Some(Mode::Write));
    }

    #[test]
    fn conflicting_kind_is_rejected() {
        let mut cell = Cell::new();
        cell.materialize(ValueKind::F32, Mode::Read).expect("materialize");
        let err = cell
            .materialize(ValueKind::F64, Mode::Read)
            .expect_err("kind conflict");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(
            cell.get::<u64>().expect_err("typed conflict").kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn reset_applies_to_write_cells_only() {
        let mut write = Cell::new();
        write.materialize(ValueKind::VecF64, Mode::Write).expect("materialize");
        write.get_mut::<Vec<f64>>().expect("get").extend([1.0, 2.0]);
        write.reset();
        assert!(write.get::<Vec<f64>>().expect("get").is_empty());

        let mut read = Cell::new();
        read.materialize(ValueKind::U32, Mode::Read).expect("materialize");
        *read.value_mut().expect("value") = Value::U32(4);
        read.reset();
        assert_eq!(read.get::<u32>().expect("get"), &4);
    }

    #[test]
    fn access_before_materialize_is_usage_error() {
        let cell = Cell::new();
        assert_eq!(cell.get::<i32>().expect_err("empty").kind(), ErrorKind::Usage);
    }
}
