//! Local File Cache Module
//!
//! Namespace-isolated on-disk store. Every peer owns `<data_dir>/<peer id>/` and keeps both
//! uploaded files and files fetched from other peers there.
//!
//! ## Contract
//! - **Overwrite**: Saving a name twice replaces the previous content; last writer wins.
//! - **Atomic visibility**: Content is streamed into a temporary file and renamed into place,
//!   so a reader never observes a half-written file.
//! - **Containment**: Filenames are validated so every path stays inside its namespace.
//!
//! No deduplication, integrity checks or quotas.

pub mod cache;
