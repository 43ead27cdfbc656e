pub mod batch;
pub mod encoding;
pub mod parse;
pub mod registry;
pub mod runner;
pub mod session;
