//! Record persistence layer.
//!
//! The metadata store keeps users, tracks, and playlists.  The
//! [`store::MetadataStore`] trait defines the interface;
//! [`sqlite::SqliteMetadataStore`] is the default implementation and
//! [`memory::MemoryMetadataStore`] serves tests and ephemeral deployments.

pub mod memory;
pub mod sqlite;
pub mod store;
