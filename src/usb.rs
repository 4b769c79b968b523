//! USB transport for NetMD recorders.
//!
//! Callers other than the command layer should not concern themselves with
//! USB at all: [`devices`] hands out ready-to-use [`NetMd`] handles.

use std::thread;
use std::time::Duration;

use rusb::{Device, DeviceHandle, Direction, GlobalContext, Recipient, RequestType};

use crate::device::NetMd;
use crate::protocol::{constants, Error, Transport};

const CONFIGURATION: u8 = 1;
const INTERFACE: u8 = 0;
const BULK_WRITE_ENDPOINT: u8 = 0x02;

const REQUEST_COMMAND: u8 = 0x80;
const REQUEST_REPLY_LENGTH: u8 = 0x01;
const REQUEST_REPLY: u8 = 0x81;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// libusb treats a zero timeout as "wait forever"; cancellation happens by
/// dropping the handle.
const NO_TIMEOUT: Duration = Duration::ZERO;

/// Returns an iterator over the NetMD recorders currently on the bus.
///
/// The bus is snapshotted up front; each matching device is opened lazily by
/// `next()`. An empty iterator is a normal outcome. Call again to rescan.
pub fn devices() -> Result<Devices, Error> {
    let mut matched = Vec::new();
    for device in rusb::devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(_) => continue,
        };
        if let Some(id) = constants::lookup_device(descriptor.vendor_id(), descriptor.product_id())
        {
            log::info!(
                "found {} ({:04x}:{:04x})",
                id.name,
                id.vendor_id,
                id.product_id
            );
            matched.push(device);
        }
    }
    Ok(Devices {
        inner: matched.into_iter(),
    })
}

/// Opens the first recorder on the bus.
pub fn first_device() -> Result<NetMd<NetMdUsb>, Error> {
    devices()?.next().ok_or(Error::NoDevice)?
}

/// Iterator over attached NetMD recorders.
pub struct Devices {
    inner: std::vec::IntoIter<Device<GlobalContext>>,
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Devices").field(&self.inner.len()).finish()
    }
}

impl Iterator for Devices {
    type Item = Result<NetMd<NetMdUsb>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let device = self.inner.next()?;
        Some(NetMdUsb::open(&device).map(NetMd::new))
    }
}

/// Exclusive low-level handle to one NetMD recorder.
///
/// Owns configuration 1 and interface 0 for its whole lifetime; dropping the
/// handle resets the device and releases the interface.
pub struct NetMdUsb {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
}

impl std::fmt::Debug for NetMdUsb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetMdUsb")
            .field("interface", &self.interface)
            .finish()
    }
}

impl NetMdUsb {
    /// Claims the device and drains any reply a previous session left behind.
    pub fn open(device: &Device<GlobalContext>) -> Result<Self, Error> {
        let mut handle = device.open().map_err(|err| match err {
            rusb::Error::Access => Error::AccessDenied,
            other => Error::Usb(other),
        })?;
        handle.set_active_configuration(CONFIGURATION)?;
        handle.claim_interface(INTERFACE)?;

        let mut usb = NetMdUsb {
            handle,
            interface: INTERFACE,
        };
        if usb.reply_length()? != 0 {
            let stale = usb.read_reply()?;
            log::debug!("drained {} stale reply byte(s)", stale.len());
        }
        Ok(usb)
    }
}

impl Transport for NetMdUsb {
    fn send_command(&mut self, command: &[u8]) -> Result<(), Error> {
        self.handle.write_control(
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface),
            REQUEST_COMMAND,
            0,
            0,
            command,
            NO_TIMEOUT,
        )?;
        Ok(())
    }

    fn reply_length(&mut self) -> Result<usize, Error> {
        let mut buf = [0u8; 4];
        self.handle.read_control(
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface),
            REQUEST_REPLY_LENGTH,
            0,
            0,
            &mut buf,
            NO_TIMEOUT,
        )?;
        Ok(buf[2] as usize)
    }

    fn read_reply(&mut self) -> Result<Vec<u8>, Error> {
        let length = loop {
            match self.reply_length()? {
                0 => thread::sleep(POLL_INTERVAL),
                length => break length,
            }
        };

        let mut reply = vec![0u8; length];
        let read = self.handle.read_control(
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface),
            REQUEST_REPLY,
            0,
            0,
            &mut reply,
            NO_TIMEOUT,
        )?;
        reply.truncate(read);
        Ok(reply)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut written = 0;
        while written < data.len() {
            written += self
                .handle
                .write_bulk(BULK_WRITE_ENDPOINT, &data[written..], NO_TIMEOUT)?;
        }
        Ok(())
    }
}

impl Drop for NetMdUsb {
    fn drop(&mut self) {
        if let Err(err) = self.handle.reset() {
            log::warn!("device reset failed: {err}");
        }
        if let Err(err) = self.handle.release_interface(self.interface) {
            log::warn!("releasing interface {} failed: {err}", self.interface);
        }
    }
}
