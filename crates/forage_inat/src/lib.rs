pub mod client;
pub mod config;
pub mod http;

pub use crate::client::{ClientInitError, InatClient};
pub use crate::config::InatConfig;
