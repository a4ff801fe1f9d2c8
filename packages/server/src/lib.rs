pub mod config;
pub mod kernel;
pub mod server;
pub mod storage;

pub use config::Config;
