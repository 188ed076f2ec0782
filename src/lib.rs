//! Retrieval-augmented question answering over regulatory documents.
//!
//! Documents are split into overlapping word chunks, embedded and stored in
//! an exact nearest-neighbor index that persists to a snapshot directory.
//! [`answer::QaEngine`] turns retrieved chunks into an answer.

pub mod answer;
pub mod config;
pub mod lock;
pub mod retrieval;
pub mod storage;

#[cfg(test)]
mod tests;
