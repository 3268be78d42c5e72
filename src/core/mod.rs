// Core modules: value model, store boundary, accessors, and the iteration engine.
pub mod binder;
pub mod cell;
pub mod chain;
pub mod error;
pub mod leaf;
pub mod memory;
pub mod store;
pub mod tree_group;
pub mod value;
pub mod varr;
pub mod wrapper;
