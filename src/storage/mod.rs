//! Upload storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where uploaded
//! bytes physically live.  Implementations include local disk, an AWS S3
//! bucket, and a process-local map for tests.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;
