//! File ingestion: loading tabular files, chunking rows, and pushing
//! embedded chunks into the vector store.

pub mod chunker;
pub mod loader;
pub mod pipeline;
pub mod queue;

pub use chunker::{Chunk, Chunker};
pub use loader::{FileLoader, LoadedElement};
pub use pipeline::{collection_name_for, IngestPipeline, IngestReport};
pub use queue::{IngestJob, IngestQueue, JobState};
