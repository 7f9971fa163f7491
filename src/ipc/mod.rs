//! IPC module for daemon-tray communication

mod protocol;
mod server;

pub use server::Server;
