//! Streaming input for the CMS ETL.
//!
//! A [`ChunkReader`] pages through one source table in bene_id range order
//! and keeps the read statistics reported with every chunk.

pub mod error;
pub mod progress;
pub mod reader;

pub use error::{IngestError, Result};
pub use progress::ChunkProgress;
pub use reader::{Chunk, ChunkReader, ReadOptions};
