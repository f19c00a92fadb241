//! shell-pty: async pseudo-terminal plumbing for the shell harness
//!
//! Starts a program on a freshly allocated pseudo-terminal, with the slave
//! side as its controlling terminal, and hands back the master side as
//! independent async read and write halves plus a handle on the process.
//!
//! # Platform Support
//!
//! - **Unix**: `rustix` for the terminal, `tokio::process` for the child
//!
//! # Quick Start
//!
//! ```no_run
//! use shell_pty::{PtyChild, PtyCommand};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut command = PtyCommand::new("/bin/sh");
//! command.args(["-i"]).env("PS1", "$ ");
//! let (master, mut child) = command.spawn()?;
//! let (mut reader, mut writer) = master.into_split();
//!
//! writer.write_all(b"echo hello\n").await?;
//! let mut buf = [0u8; 1024];
//! let n = reader.read(&mut buf).await?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! child.kill()?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod process;

#[cfg(unix)]
pub mod unix;

pub use command::PtyCommand;
pub use error::{PtyError, Result};
pub use process::{ExitStatus, PtyChild, PtySignal, SHELL_SIGNAL_BASE};

#[cfg(unix)]
pub use unix::{PtyReader, PtyWriter, UnixPtyChild, UnixPtyMaster};

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn interactive_shell_answers_over_the_master() {
        let mut command = PtyCommand::new("/bin/sh");
        command.args(["-i"]).env("PS1", "pty$ ").env_remove("ENV");
        let (master, mut child) = command.spawn().unwrap();
        let (mut reader, mut writer) = master.into_split();

        writer.write_all(b"echo $((6 * 7)); exit 3\n").await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert!(String::from_utf8_lossy(&out).contains("42"));
        assert_eq!(child.wait().await.unwrap(), ExitStatus::Exited(3));
    }
}
