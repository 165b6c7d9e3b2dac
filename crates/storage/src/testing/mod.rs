//! Test-only backend implementations.
//!
//! Not compiled into release builds of dependents unless they opt in —
//! but since this whole workspace has no on-disk backend of its own yet,
//! `MemoryBackend` is exported unconditionally so integration tests in
//! every crate (and downstream HTTP binaries wiring up a demo) can use it
//! without a `dev-dependencies`-only cycle.

mod mock_backend;

pub use mock_backend::MemoryBackend;
