//! Relational storage for the CMS ETL.
//!
//! The ETL talks to its database through the traits in [`store`]; the
//! SQLite implementation in [`sqlite`] backs both the CLI and the tests.

pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::{SqliteStore, quote_ident};
pub use store::{
    FactStore, IdentityRow, IdentityStore, QualifiedTable, RangeScan, SourceStore, StatusStore,
    Store,
};
