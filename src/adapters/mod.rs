//! Transport adapters
//!
//! This module contains implementations of the `Transport` trait, the
//! line-oriented request/reply channel a hardware session talks through.

use crate::error::LabResult;

pub mod mock;
pub mod serial_adapter;

pub use mock::MockAdapter;
pub use serial_adapter::SerialAdapter;

/// Blocking, line-oriented link to a device.
///
/// Each `query` writes one command and waits for one reply line. A session
/// owns its transport exclusively, so every method takes `&mut self`.
pub trait Transport: Send {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Open the underlying link.
    fn connect(&mut self) -> LabResult<()>;

    /// Release the underlying link. Calling it on a closed link is a no-op.
    fn disconnect(&mut self) -> LabResult<()>;

    /// Whether the link is currently open.
    fn is_connected(&self) -> bool;

    /// Send one command and return its trimmed reply.
    fn query(&mut self, command: &str) -> LabResult<String>;

    /// Send several commands as one exchange and return the replies in order.
    ///
    /// Implementations must not interleave other traffic between the
    /// commands of one batch.
    fn query_batch(&mut self, commands: &[String]) -> LabResult<Vec<String>>;

    /// Discard replies that arrived after their exchange gave up waiting.
    fn clear_input(&mut self) -> LabResult<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self) -> LabResult<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> LabResult<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn query(&mut self, command: &str) -> LabResult<String> {
        (**self).query(command)
    }

    fn query_batch(&mut self, commands: &[String]) -> LabResult<Vec<String>> {
        (**self).query_batch(commands)
    }

    fn clear_input(&mut self) -> LabResult<()> {
        (**self).clear_input()
    }
}
