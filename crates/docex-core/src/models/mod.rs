//! Data models: configuration, canonical document, stream events.

pub mod config;
pub mod document;
pub mod event;
