//! Local classifiers: filename heuristics and embedding similarity

pub mod filename;
pub mod semantic;

pub use semantic::{CategoryEmbeddings, FastEmbedModel, SemanticModel};
