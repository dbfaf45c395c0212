//! CLI command handlers.

pub(crate) mod catalog;
pub(crate) mod config;
pub(crate) mod manifest;
pub(crate) mod run;
