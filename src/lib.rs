pub mod config;
pub mod content;
pub mod curriculum;
pub mod error;
pub mod grading;
pub mod models;
pub mod progression;
pub mod store;

pub use error::EngineError;
