//! Process lifecycle: graceful shutdown on SIGTERM/SIGINT

mod shutdown;

pub use shutdown::ShutdownSignal;
