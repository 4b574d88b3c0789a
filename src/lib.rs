// ABOUTME: The abot application crate: configuration, the console backend and built-in commands
// ABOUTME: The runtime itself lives in abot-core

pub mod builtin;
pub mod config;
pub mod console;
pub mod paths;
