//! Retrieval collaborator backed by a local full-text index.
//!
//! Documents are split into overlapping chunks on ingestion and searched with
//! SQLite FTS5 (BM25 ranking). The graph engine only sees the [`Retriever`]
//! trait; this crate is one way to satisfy it.
//!
//! [`Retriever`]: herald_core::traits::Retriever

pub mod ingest;
pub mod store;

pub use ingest::{ingest_dir, load_documents, split_text, Document, IngestReport};
pub use store::KnowledgeBase;
