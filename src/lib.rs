pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod query;
pub mod source;
