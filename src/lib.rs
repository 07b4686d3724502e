pub mod asset;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod ipc;
pub mod queue;
pub mod store;
pub mod trigger;
pub mod worker;
