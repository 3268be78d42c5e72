//! Purpose: Typed, named column accessors over a pluggable columnar record store.
//! Exports: `api` (engine, accessors, store boundary, errors), `notice`.
//! Role: Library backing the `treewrap` CLI; `api` is the supported surface.
//! Invariants: Internal modules stay reachable only through `api`.
//! Invariants: The engine never owns its store; callers lend it for the engine's lifetime.
pub mod api;
mod core;
pub mod notice;
