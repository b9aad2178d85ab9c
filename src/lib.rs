pub mod adapters;
pub mod api;
pub mod config;
pub mod errors;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod pipeline;

#[cfg(test)]
pub mod tests;

pub use config::AppConfig;
pub use errors::*;
