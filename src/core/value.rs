//! Purpose: Define the closed set of column kinds and the tagged value that erases them.
//! Exports: `ValueKind`, `Value`, `ColumnType`, `ArrayElement`, `LengthType`.
//! Role: Every in-memory column buffer is a `Value`; typed access goes through `ColumnType`.
//! Invariants: A `Value` never changes kind after construction through this crate's APIs.
//! Invariants: Typed access checks the tag; storage is never reinterpreted as another kind.
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Str,
    VecI32,
    VecI64,
    VecU32,
    VecU64,
    VecF32,
    VecF64,
}

const ALL_KINDS: [ValueKind; 14] = [
    ValueKind::Bool,
    ValueKind::I32,
    ValueKind::I64,
    ValueKind::U32,
    ValueKind::U64,
    ValueKind::F32,
    ValueKind::F64,
    ValueKind::Str,
    ValueKind::VecI32,
    ValueKind::VecI64,
    ValueKind::VecU32,
    ValueKind::VecU64,
    ValueKind::VecF32,
    ValueKind::VecF64,
];

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Str => "str",
            ValueKind::VecI32 => "vec_i32",
            ValueKind::VecI64 => "vec_i64",
            ValueKind::VecU32 => "vec_u32",
            ValueKind::VecU64 => "vec_u64",
            ValueKind::VecF32 => "vec_f32",
            ValueKind::VecF64 => "vec_f64",
        }
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueKind::VecI32
                | ValueKind::VecI64
                | ValueKind::VecU32
                | ValueKind::VecU64
                | ValueKind::VecF32
                | ValueKind::VecF64
        )
    }

    /// Kinds usable as the governing column of a variable-length array group.
    pub fn is_length(self) -> bool {
        matches!(self, ValueKind::U32 | ValueKind::U64)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown column kind '{s}'"))
                    .with_hint("Use one of bool, i32, i64, u32, u64, f32, f64, str, vec_<num>.")
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    VecI32(Vec<i32>),
    VecI64(Vec<i64>),
    VecU32(Vec<u32>),
    VecU64(Vec<u64>),
    VecF32(Vec<f32>),
    VecF64(Vec<f64>),
}

// Applies the same expression to the payload of every array variant.
macro_rules! on_array {
    ($value:expr, $v:ident => $body:expr, _ => $other:expr) => {
        match $value {
            Value::VecI32($v) => $body,
            Value::VecI64($v) => $body,
            Value::VecU32($v) => $body,
            Value::VecU64($v) => $body,
            Value::VecF32($v) => $body,
            Value::VecF64($v) => $body,
            _ => $other,
        }
    };
}

impl Value {
    pub fn default_of(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::I32 => Value::I32(0),
            ValueKind::I64 => Value::I64(0),
            ValueKind::U32 => Value::U32(0),
            ValueKind::U64 => Value::U64(0),
            ValueKind::F32 => Value::F32(0.0),
            ValueKind::F64 => Value::F64(0.0),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::VecI32 => Value::VecI32(Vec::new()),
            ValueKind::VecI64 => Value::VecI64(Vec::new()),
            ValueKind::VecU32 => Value::VecU32(Vec::new()),
            ValueKind::VecU64 => Value::VecU64(Vec::new()),
            ValueKind::VecF32 => Value::VecF32(Vec::new()),
            ValueKind::VecF64 => Value::VecF64(Vec::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Str(_) => ValueKind::Str,
            Value::VecI32(_) => ValueKind::VecI32,
            Value::VecI64(_) => ValueKind::VecI64,
            Value::VecU32(_) => ValueKind::VecU32,
            Value::VecU64(_) => ValueKind::VecU64,
            Value::VecF32(_) => ValueKind::VecF32,
            Value::VecF64(_) => ValueKind::VecF64,
        }
    }

    /// Restores the kind's default: zero for scalars, empty for strings and arrays.
    pub fn reset(&mut self) {
        match self {
            Value::Bool(v) => *v = false,
            Value::I32(v) => *v = 0,
            Value::I64(v) => *v = 0,
            Value::U32(v) => *v = 0,
            Value::U64(v) => *v = 0,
            Value::F32(v) => *v = 0.0,
            Value::F64(v) => *v = 0.0,
            Value::Str(v) => v.clear(),
            other => on_array!(other, v => v.clear(), _ => ()),
        }
    }

    /// Element count of an array value; `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        on_array!(self, v => Some(v.len()), _ => None)
    }

    /// Resizes an array value, padding with zeros. Scalars are left untouched.
    pub fn resize(&mut self, len: usize) {
        on_array!(self, v => v.resize(len, Default::default()), _ => ())
    }

    /// Reads an unsigned length column value as an element count.
    pub fn as_len(&self) -> Option<usize> {
        match self {
            Value::U32(v) => usize::try_from(*v).ok(),
            Value::U64(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            Value::Bool(_) => 1,
            Value::I32(_) | Value::U32(_) | Value::F32(_) => 4,
            Value::I64(_) | Value::U64(_) | Value::F64(_) => 8,
            Value::Str(v) => v.len(),
            other => on_array!(other, v => std::mem::size_of_val(v.as_slice()), _ => 0),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(v) => json!(v),
            Value::I32(v) => json!(v),
            Value::I64(v) => json!(v),
            Value::U32(v) => json!(v),
            Value::U64(v) => json!(v),
            Value::F32(v) => json!(v),
            Value::F64(v) => json!(v),
            Value::Str(v) => json!(v),
            Value::VecI32(v) => json!(v),
            Value::VecI64(v) => json!(v),
            Value::VecU32(v) => json!(v),
            Value::VecU64(v) => json!(v),
            Value::VecF32(v) => json!(v),
            Value::VecF64(v) => json!(v),
        }
    }

    /// Decodes a JSON value as `kind`. `null` decodes to the kind's default.
    pub fn from_json(kind: ValueKind, json: &serde_json::Value) -> Result<Self, Error> {
        if json.is_null() {
            return Ok(Value::default_of(kind));
        }
        match kind {
            ValueKind::Bool => decode::<bool>(json),
            ValueKind::I32 => decode::<i32>(json),
            ValueKind::I64 => decode::<i64>(json),
            ValueKind::U32 => decode::<u32>(json),
            ValueKind::U64 => decode::<u64>(json),
            ValueKind::F32 => decode::<f32>(json),
            ValueKind::F64 => decode::<f64>(json),
            ValueKind::Str => decode::<String>(json),
            ValueKind::VecI32 => decode::<Vec<i32>>(json),
            ValueKind::VecI64 => decode::<Vec<i64>>(json),
            ValueKind::VecU32 => decode::<Vec<u32>>(json),
            ValueKind::VecU64 => decode::<Vec<u64>>(json),
            ValueKind::VecF32 => decode::<Vec<f32>>(json),
            ValueKind::VecF64 => decode::<Vec<f64>>(json),
        }
    }
}

fn decode<T: ColumnType + DeserializeOwned>(json: &serde_json::Value) -> Result<Value, Error> {
    serde_json::from_value::<T>(json.clone())
        .map(ColumnType::into_value)
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("value {json} is not a valid {}", T::KIND))
                .with_source(err)
        })
}

/// A Rust type that can back a column buffer.
pub trait ColumnType: Default + Clone + 'static {
    const KIND: ValueKind;

    fn into_value(self) -> Value;
    fn peek(value: &Value) -> Option<&Self>;
    fn peek_mut(value: &mut Value) -> Option<&mut Self>;
}

macro_rules! column_types {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ColumnType for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn peek(value: &Value) -> Option<&Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn peek_mut(value: &mut Value) -> Option<&mut Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

column_types!(
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    Vec<i32> => VecI32,
    Vec<i64> => VecI64,
    Vec<u32> => VecU32,
    Vec<u64> => VecU64,
    Vec<f32> => VecF32,
    Vec<f64> => VecF64,
);

/// Element type of a variable-length array column.
pub trait ArrayElement: Copy + Default + 'static {
    type Column: ColumnType + AsRef<[Self]>;
}

/// Unsigned type of a length-governing column.
pub trait LengthType: ColumnType + Copy {}

macro_rules! array_elements {
    ($($ty:ty),*) => {
        $(
            impl ArrayElement for $ty {
                type Column = Vec<$ty>;
            }
        )*
    };
}

array_elements!(i32, i64, u32, u64, f32, f64);

impl LengthType for u32 {}
impl LengthType for u64 {}

#[cfg(test)]
mod tests {
    use super::{ArrayElement, ColumnType, Value, ValueKind};
    use serde_json::json;

    #[test]
    fn reset_restores_kind_default() {
        let mut scalar = Value::F64(3.5);
        scalar.reset();
        assert_eq!(scalar, Value::F64(0.0));

        let mut text = Value::Str("muon".to_string());
        text.reset();
        assert_eq!(text, Value::Str(String::new()));

        let mut array = Value::VecU32(vec![1, 2, 3]);
        array.reset();
        assert_eq!(array, Value::VecU32(Vec::new()));
    }

    #[test]
    fn resize_only_touches_arrays() {
        let mut array = Value::VecI32(vec![4, 5, 6]);
        array.resize(1);
        assert_eq!(array, Value::VecI32(vec![4]));
        array.resize(3);
        assert_eq!(array, Value::VecI32(vec![4, 0, 0]));

        let mut scalar = Value::I32(9);
        scalar.resize(5);
        assert_eq!(scalar, Value::I32(9));
        assert_eq!(scalar.len(), None);
    }

    #[test]
    fn typed_peek_checks_tag() {
        let value = Value::I32(5);
        assert_eq!(i32::peek(&value), Some(&5));
        assert_eq!(i64::peek(&value), None);
        assert_eq!(<Vec<f32>>::peek(&Value::VecF32(vec![1.0])), Some(&vec![1.0]));
        assert_eq!(<f32 as ArrayElement>::Column::KIND, ValueKind::VecF32);
    }

    #[test]
    fn lengths_only_from_unsigned_kinds() {
        assert_eq!(Value::U32(3).as_len(), Some(3));
        assert_eq!(Value::U64(7).as_len(), Some(7));
        assert_eq!(Value::I32(3).as_len(), None);
        assert!(ValueKind::U32.is_length());
        assert!(!ValueKind::I64.is_length());
    }

    #[test]
    fn json_decoding_follows_kind() {
        assert_eq!(
            Value::from_json(ValueKind::VecU64, &json!([1, 2])).expect("decode"),
            Value::VecU64(vec![1, 2])
        );
        assert_eq!(
            Value::from_json(ValueKind::I64, &serde_json::Value::Null).expect("decode"),
            Value::I64(0)
        );
        assert!(Value::from_json(ValueKind::U32, &json!(-1)).is_err());
        assert_eq!(Value::VecF64(vec![0.5]).to_json(), json!([0.5]));
    }

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in super::ALL_KINDS {
            assert_eq!(kind.name().parse::<ValueKind>().expect("parse"), kind);
        }
        assert!("complex".parse::<ValueKind>().is_err());
    }
}
