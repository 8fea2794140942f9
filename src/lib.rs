pub mod admin;
pub mod config;
pub mod error;
pub mod protocol;
pub mod realm;
pub mod registry;
pub mod server;
pub mod session;
pub mod utils;

pub use server::Server;
