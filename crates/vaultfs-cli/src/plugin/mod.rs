//! Docker volume plugin endpoint.

pub mod protocol;
pub mod server;

pub use server::PluginServer;
