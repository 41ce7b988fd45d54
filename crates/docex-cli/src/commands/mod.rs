pub mod batch;
pub mod config;
pub mod documents;
pub mod extract;
pub mod models;
