pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod hardware;
pub mod http;
pub mod node;
pub mod readings;
pub mod services;

#[cfg(test)]
pub mod test_support;
