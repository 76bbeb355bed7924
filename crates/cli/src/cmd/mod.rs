//! Command implementations

pub mod config;
pub mod enqueue;
pub mod entities;
pub mod forget;
pub mod metrics;
pub mod run;
pub mod scan;
pub mod status;
pub mod stop;
