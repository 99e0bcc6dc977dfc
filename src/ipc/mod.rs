//! IPC module for controlling the session from other processes

mod protocol;
mod server;

pub use server::Server;
