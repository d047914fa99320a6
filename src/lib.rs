//! ScriptRag - question answering over movie screenplays
//!
//! Screenplays are split into overlapping token windows, embedded into a
//! persistent vector index, and queried through a language model that answers
//! only from the retrieved passages.

pub mod app;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod resilience;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod synthesis;

pub use error::{Result, ScriptRagError};
