//! A pure Rust implementation of the NetMD protocol, suitable for uploading
//! audio tracks to USB MiniDisc recorders.
//!
//! The crate drives the recorder end to end: device discovery, the vendor
//! control/bulk USB transport, the query codec the protocol is written in,
//! the DRM key exchange, and the encrypted track download itself.
//!
//! ```no_run
//! use netmd::download::download_track;
//!
//! # fn main() -> Result<(), netmd::Error> {
//! let mut recorder = netmd::usb::first_device()?;
//! recorder.erase_disc()?;
//! recorder.set_disc_title(b"Mixtape", false)?;
//! download_track(&mut recorder, "track01.pcm", "First Song")?;
//! # Ok(())
//! # }
//! ```

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod device;
pub mod download;
pub mod protocol;
pub mod secure;
pub mod usb;

pub use device::NetMd;
pub use protocol::Error;
