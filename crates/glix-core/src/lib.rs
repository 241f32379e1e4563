//! Core library for glix: locate, fetch, unpack, register and link against
//! historical Ubuntu glibc builds.

pub mod catalog;
pub mod config;
pub mod install;
pub mod io;
pub mod libc;
pub mod paths;
pub mod relinker;
pub mod store;
pub mod tool;

pub mod reporter;

pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("glix/", env!("CARGO_PKG_VERSION"));
