//! Purpose: Stderr notice for columns a dump names but the store does not hold.
//! Exports: `UnresolvedColumn`, `ColumnRole`.
//! Role: CLI diagnostics; the dump skips the column and keeps going.
//! Invariants: Notices never alter stdout payloads.
use serde::Serialize;
use serde_json::{Value, json};

/// How the dump request used the missing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Scalar,
    /// Length column of an `--array` request; the whole group is skipped.
    Length,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedColumn {
    pub store: String,
    pub column: String,
    pub role: ColumnRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl UnresolvedColumn {
    pub fn new(store: &str, column: &str, role: ColumnRole) -> Self {
        Self {
            store: store.to_string(),
            column: column.to_string(),
            role,
            time: None,
        }
    }

    pub fn with_time(mut self, time: Option<String>) -> Self {
        self.time = time;
        self
    }

    pub fn message(&self) -> String {
        match self.role {
            ColumnRole::Scalar => format!("column '{}' not found; skipped", self.column),
            ColumnRole::Length => {
                format!("length column '{}' not found; array skipped", self.column)
            }
            ColumnRole::Member => format!("array column '{}' not found; skipped", self.column),
        }
    }

    /// `{"notice":{"kind":"unresolved_column","store":..,"column":..,"role":..,"message":..}}`
    pub fn to_json(&self) -> Value {
        let mut body = json!(self);
        if let Some(fields) = body.as_object_mut() {
            fields.insert("kind".to_string(), json!("unresolved_column"));
            fields.insert("message".to_string(), json!(self.message()));
        }
        json!({ "notice": body })
    }
}
