pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
