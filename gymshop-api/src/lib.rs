pub mod config;
pub mod extract;
pub mod handlers;
pub mod logging;
pub mod observability;
pub mod response;
pub mod server;
pub mod state;
