//! Pseudo-terminal process plumbing for the assistant CLI.

pub mod codec;
pub mod process;
pub mod pty;

pub use process::{PtyProcess, SpawnSpec};
