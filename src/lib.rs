#![recursion_limit = "256"]
pub mod auth;
pub mod client;
pub mod common;
pub mod config;
pub mod daemon;
pub mod entry;
pub mod error;
pub mod logging;
pub mod preferences;
pub mod rpc;
pub mod session;
pub mod webui;

pub use error::DelugeError;
