//! Error types shared by the transport, codec, and command layers.

use thiserror::Error;

/// An error raised while talking to a NetMD recorder.
#[derive(Error, Debug)]
pub enum Error {
    /// No supported recorder is attached to the bus.
    #[error("no NetMD devices found")]
    NoDevice,
    /// The host refused access to the USB device.
    ///
    /// Usually fixed by a udev rule or by running as root.
    #[error("insufficient permissions to open the USB device")]
    AccessDenied,
    /// A USB transfer failed.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
    /// Reading a track file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The device does not implement the requested operation (status 0x08).
    #[error("operation not implemented by the device")]
    NotImplemented,
    /// The device rejected the requested operation (status 0x0a).
    #[error("operation rejected by the device")]
    Rejected,
    /// A response byte did not match the expected literal.
    #[error("response mismatch at offset {offset}: expected {expected:#04x}, got {actual:#04x}")]
    Mismatch {
        /// Byte offset into the response payload.
        offset: usize,
        /// The literal the pattern called for.
        expected: u8,
        /// The byte the device actually sent.
        actual: u8,
    },
    /// The response was malformed in some other way.
    #[error("invalid response: {0}")]
    Invalid(String),
    /// A caller-supplied value cannot be represented on the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
