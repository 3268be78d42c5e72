//! Purpose: Define the public Rust API boundary for treewrap.
//! Exports: The iteration engine, accessor views, value model, and store boundary.
//! Role: Additive-only surface; hides the internal module layout.
//! Invariants: This module is the only public path to core types.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::binder::activate_column;
pub use crate::core::cell::Mode;
pub use crate::core::chain::Chain;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::leaf::{Leaf, LeafMut};
pub use crate::core::memory::MemoryStore;
pub use crate::core::store::{Binding, ColumnDesc, ColumnHandle, Store};
pub use crate::core::tree_group::TreeGroup;
pub use crate::core::value::{ArrayElement, ColumnType, LengthType, Value, ValueKind};
pub use crate::core::varr::{DEFAULT_CAPACITY, VarrGroup, VarrGroupMut, VarrLeaf, VarrLeafMut};
pub use crate::core::wrapper::TreeWrapper;
