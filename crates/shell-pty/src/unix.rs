//! Unix backend: `openpt`-style allocation, an `AsyncFd` master, and a
//! `tokio::process` child attached to the slave.

mod child;
mod pty;

pub use child::UnixPtyChild;
pub use pty::{PtyReader, PtyWriter, UnixPtyMaster};

pub(crate) use child::spawn_child;
pub(crate) use pty::open_slave;
