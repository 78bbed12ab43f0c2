#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod profile;
pub mod search;
pub mod session;
pub mod textfmt;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
