//! The NetMD wire protocol: status bytes, the query codec, and the constants
//! every layer above shares.
//!
//! NetMD is a strict request/response protocol. Every request is one control
//! frame whose first byte selects the request class; every reply opens with a
//! status byte that the command layer maps to success or a typed failure.

pub mod bcd;
pub mod constants;
pub mod query;

mod error;

use enum_primitive_derive::Primitive;
pub use error::*;

/// Request class for commands that change device state.
pub const REQUEST_CONTROL: u8 = 0x00;

/// Request class for pure status queries.
pub const REQUEST_STATUS: u8 = 0x01;

/// The status byte opening every reply.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum Status {
    /// The operation exists but is not implemented on this recorder.
    NotImplemented = 0x08,
    /// The control request was accepted.
    Accepted = 0x09,
    /// The request was understood but refused.
    Rejected = 0x0a,
    /// The device is busy transitioning between states.
    InTransition = 0x0b,
    /// The status request was answered.
    Implemented = 0x0c,
    /// Notification of a state change.
    Changed = 0x0d,
    /// Partial answer; more data follows.
    Interim = 0x0f,
}

/// Byte-level channel to a recorder.
///
/// The USB transport is the one real implementation; tests drive the command
/// layer through scripted substitutes.
pub trait Transport {
    /// Ships one control frame to the device.
    fn send_command(&mut self, command: &[u8]) -> Result<(), Error>;

    /// Number of reply bytes the device has pending, zero if none.
    fn reply_length(&mut self) -> Result<usize, Error>;

    /// Blocks until a reply is pending, then reads it whole.
    fn read_reply(&mut self) -> Result<Vec<u8>, Error>;

    /// Streams one buffer over the bulk endpoint.
    fn write_bulk(&mut self, data: &[u8]) -> Result<(), Error>;
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::collections::VecDeque;

    use super::{Error, Transport};

    /// Transport fed from a script of canned replies, recording everything
    /// the caller sends.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) replies: VecDeque<Vec<u8>>,
        pub(crate) commands: Vec<Vec<u8>>,
        pub(crate) bulk: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queues a reply with the given status byte and payload.
        pub(crate) fn push_reply(&mut self, status: u8, payload: &[u8]) {
            let mut reply = Vec::with_capacity(payload.len() + 1);
            reply.push(status);
            reply.extend_from_slice(payload);
            self.replies.push_back(reply);
        }
    }

    impl Transport for ScriptedTransport {
        fn send_command(&mut self, command: &[u8]) -> Result<(), Error> {
            self.commands.push(command.to_vec());
            Ok(())
        }

        fn reply_length(&mut self) -> Result<usize, Error> {
            Ok(self.replies.front().map_or(0, Vec::len))
        }

        fn read_reply(&mut self) -> Result<Vec<u8>, Error> {
            self.replies
                .pop_front()
                .ok_or_else(|| Error::Invalid("reply script exhausted".into()))
        }

        fn write_bulk(&mut self, data: &[u8]) -> Result<(), Error> {
            self.bulk.push(data.to_vec());
            Ok(())
        }
    }
}
