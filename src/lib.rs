// Library interface for newswatch modules
// This allows tests and other binaries to import modules

pub mod classifier;
pub mod config;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod llm;
pub mod pipeline;
pub mod scrape;
pub mod storage;
