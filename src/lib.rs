//! Retrieval-augmented eye-examination chat and speech-to-text service.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
