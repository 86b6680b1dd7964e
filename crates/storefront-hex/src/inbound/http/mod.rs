mod events;
mod server;

pub use server::{AppState, HttpServer, HttpServerConfig};
