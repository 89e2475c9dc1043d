pub mod core;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod server;
pub mod state;
pub mod threads;
pub mod vector;
