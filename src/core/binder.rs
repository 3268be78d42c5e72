// Deferred create-or-attach of a named column, run whenever a store becomes available.
use tracing::{debug, error, warn};

use crate::core::store::{ColumnHandle, Store};
use crate::core::value::ValueKind;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Binder {
    Create { kind: ValueKind },
    Attach { kind: ValueKind },
    AttachArray { kind: ValueKind, length_column: String },
}

impl Binder {
    /// Schema problems are logged and leave the accessor unbound (`None`).
    pub fn bind(&self, name: &str, store: &mut dyn Store) -> Option<ColumnHandle> {
        match self {
            // A store that already holds the column (a re-attach) keeps receiving its writes.
            Binder::Create { kind } if store.locate_column(name).is_some() => {
                let handle = locate(name, *kind, store)?;
                debug!(column = name, kind = %kind, "writing to existing column");
                Some(handle)
            }
            Binder::Create { kind } => match store.create_column(name, *kind) {
                Ok(handle) => {
                    debug!(column = name, kind = %kind, "created column");
                    Some(handle)
                }
                Err(err) => {
                    error!(column = name, error = %err, "failed to create column");
                    None
                }
            },
            Binder::Attach { kind } => {
                let handle = locate(name, *kind, store)?;
                activate_column(store, handle);
                Some(handle)
            }
            Binder::AttachArray {
                kind,
                length_column,
            } => {
                let handle = locate(name, *kind, store)?;
                let count_column = store
                    .describe(handle)
                    .and_then(|desc| desc.count_column.clone());
                match count_column {
                    None => {
                        error!(
                            column = name,
                            "no count column in store; access it as a plain vector column instead"
                        );
                        return None;
                    }
                    Some(count) if count != *length_column => {
                        error!(
                            column = name,
                            store_count = %count,
                            length_column = %length_column,
                            "count column in store differs from the group's length column"
                        );
                        return None;
                    }
                    Some(_) => {}
                }
                activate_column(store, handle);
                Some(handle)
            }
        }
    }
}

fn locate(name: &str, kind: ValueKind, store: &dyn Store) -> Option<ColumnHandle> {
    let Some(handle) = store.locate_column(name) else {
        warn!(column = name, "column not found in store");
        return None;
    };
    let stored = store.describe(handle).map(|desc| desc.kind);
    if stored != Some(kind) {
        error!(
            column = name,
            requested = %kind,
            stored = ?stored,
            "column kind in store differs from the requested kind"
        );
        return None;
    }
    Some(handle)
}

/// Enables a column for fetch, recursing into its sub-columns.
pub fn activate_column(store: &mut dyn Store, handle: ColumnHandle) {
    store.set_status(handle, true);
    let children = store
        .describe(handle)
        .map(|desc| desc.children.clone())
        .unwrap_or_default();
    for child in children {
        activate_column(store, child);
    }
}
