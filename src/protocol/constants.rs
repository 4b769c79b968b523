//! Protocol constants: the supported-recorder table, audio formats, and the
//! key material of the NetMD DRM scheme.

use bitflags::bitflags;
use enum_primitive_derive::Primitive;

/// A USB recorder known to speak NetMD.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UsbId {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// Marketing name, for discovery logs.
    pub name: &'static str,
}

const fn usb_id(vendor_id: u16, product_id: u16, name: &'static str) -> UsbId {
    UsbId {
        vendor_id,
        product_id,
        name,
    }
}

/// Every (vendor, product) pair known to implement the NetMD protocol.
pub const KNOWN_DEVICES: &[UsbId] = &[
    usb_id(0x04dd, 0x7202, "Sharp IM-MT899H"),
    usb_id(0x054c, 0x0075, "Sony MZ-N1"),
    usb_id(0x054c, 0x0080, "Sony LAM-1"),
    usb_id(0x054c, 0x0081, "Sony MDS-JB980"),
    usb_id(0x054c, 0x0084, "Sony MZ-N505"),
    usb_id(0x054c, 0x0085, "Sony MZ-S1"),
    usb_id(0x054c, 0x0086, "Sony MZ-N707"),
    usb_id(0x054c, 0x00c6, "Sony MZ-N10"),
    usb_id(0x054c, 0x00c7, "Sony MZ-N910"),
    usb_id(0x054c, 0x00c8, "Sony MZ-N710/NF810"),
    usb_id(0x054c, 0x00c9, "Sony MZ-N510/N610"),
    usb_id(0x054c, 0x00ca, "Sony MZ-NE410/NF520D"),
    usb_id(0x054c, 0x00eb, "Sony MZ-NE810/NE910"),
    usb_id(0x054c, 0x0101, "Sony LAM-10"),
    usb_id(0x054c, 0x0113, "Aiwa AM-NX1"),
    usb_id(0x054c, 0x014c, "Aiwa AM-NX9"),
    usb_id(0x054c, 0x017e, "Sony MZ-NH1"),
    usb_id(0x054c, 0x0180, "Sony MZ-NH3D"),
    usb_id(0x054c, 0x0182, "Sony MZ-NH900"),
    usb_id(0x054c, 0x0184, "Sony MZ-NH700/NH800"),
    usb_id(0x054c, 0x0186, "Sony MZ-NH600/NH600D"),
    usb_id(0x054c, 0x0188, "Sony MZ-N920"),
    usb_id(0x054c, 0x018a, "Sony LAM-3"),
    usb_id(0x054c, 0x01e9, "Sony MZ-DH10P"),
    usb_id(0x054c, 0x0219, "Sony MZ-RH10"),
    usb_id(0x054c, 0x021b, "Sony MZ-RH710/MZ-RH910"),
    usb_id(0x054c, 0x022c, "Sony CMT-AH10"),
    usb_id(0x054c, 0x023c, "Sony DS-HMD1"),
    usb_id(0x054c, 0x0286, "Sony MZ-RH1"),
];

/// Looks up a recorder in the allow-list.
pub fn lookup_device(vendor_id: u16, product_id: u16) -> Option<&'static UsbId> {
    KNOWN_DEVICES
        .iter()
        .find(|id| id.vendor_id == vendor_id && id.product_id == product_id)
}

/// Encoding of the audio data sent over the USB link.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum WireFormat {
    /// Raw big-endian signed-16 PCM.
    Pcm = 0x00,
    /// ATRAC3 at 105 kbps.
    Kbps105 = 0x90,
    /// ATRAC3 LP2.
    Lp2 = 0x94,
    /// ATRAC3 LP4.
    Lp4 = 0xa8,
}

impl WireFormat {
    /// Size of one audio frame on the link, in bytes.
    pub fn frame_size(self) -> usize {
        match self {
            WireFormat::Pcm => 2048,
            WireFormat::Kbps105 => 152,
            WireFormat::Lp2 => 192,
            WireFormat::Lp4 => 96,
        }
    }

    /// Encoding stored on the MD medium for data sent in this wire format.
    pub fn disk_format(self) -> DiskFormat {
        match self {
            WireFormat::Pcm => DiskFormat::SpStereo,
            WireFormat::Kbps105 | WireFormat::Lp2 => DiskFormat::Lp2,
            WireFormat::Lp4 => DiskFormat::Lp4,
        }
    }
}

/// Encoding of the audio data as stored on the MD medium.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum DiskFormat {
    /// ATRAC3 LP4.
    Lp4 = 0,
    /// ATRAC3 LP2.
    Lp2 = 2,
    /// Standard play, mono.
    SpMono = 4,
    /// Standard play, stereo.
    SpStereo = 6,
}

bitflags! {
    /// The disc-flags byte reported by the device.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DiscFlags: u8 {
        /// The disc accepts recording.
        const WRITABLE = 0x10;
        /// The write-protect tab is closed.
        const WRITE_PROTECTED = 0x40;
    }
}

/// The all-zero DES initialization vector.
pub const ZERO_IV: [u8; 8] = [0; 8];

/// Root key delivered by the built-in EKB.
pub const ROOT_KEY: [u8; 16] = [
    0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x0f, 0xed, 0xcb, 0xa9, 0x87, 0x65, 0x43, 0x21,
];

/// Key-encryption key wrapping the per-track data key.
pub const KEK: [u8; 8] = [0x14, 0xe3, 0x83, 0x4e, 0xe2, 0xd3, 0xcc, 0xa5];

/// Content ID registered for every downloaded track.
pub const CONTENT_ID: [u8; 20] = [
    0x01, 0x0f, 0x50, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x48, 0xa2, 0x8d, 0x3e, 0x1a, 0x3b, 0x0c,
    0x44, 0xaf, 0x2f, 0xa0,
];

/// Per-track data key as it appears on the wire, wrapped under the KEK.
pub const PACKET_KEY: [u8; 8] = [0x96, 0x03, 0xc7, 0xc0, 0x53, 0x37, 0xd2, 0xf0];

/// Initialization vector for the first packet of every track.
pub const PACKET_IV: [u8; 8] = [0x08, 0xd9, 0xcb, 0xd4, 0xc1, 0x5e, 0xc0, 0xff];

/// An Enabling Key Block: the root key encrypted under a device key set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EkbData {
    /// Identifier of this EKB.
    pub id: u32,
    /// Chain of encrypted keys, root key first.
    pub chain: [[u8; 16]; 2],
    /// Depth in the device-ID tree selecting the starting device key.
    pub depth: u32,
    /// Signature over the root key.
    pub signature: [u8; 24],
}

/// The EKB every NetMD recorder can unwrap.
pub const EKB: EkbData = EkbData {
    id: 0x2642_2642,
    chain: [
        [
            0x25, 0x45, 0x06, 0x4d, 0xea, 0xca, 0x14, 0xf9, 0x96, 0xbd, 0xc8, 0xa4, 0x06, 0xc2,
            0x2b, 0x81,
        ],
        [
            0xfb, 0x60, 0xbd, 0xdd, 0x0d, 0xbc, 0xab, 0x84, 0x8a, 0x00, 0x5e, 0x03, 0x19, 0x4d,
            0x3e, 0xda,
        ],
    ],
    depth: 9,
    signature: [
        0x8f, 0x2b, 0xc3, 0x52, 0xe8, 0x6c, 0x5e, 0xd3, 0x06, 0xdc, 0xae, 0x18, 0xd2, 0xf3, 0x8c,
        0x7f, 0x89, 0xb5, 0xe1, 0x85, 0x55, 0xa1, 0x05, 0xea,
    ],
};
