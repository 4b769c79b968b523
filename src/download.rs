//! Track packetization and the download pipeline.
//!
//! A track file is carved into packets of up to 2048 frames. The whole track
//! is encrypted by one DES-CBC context keyed by the unwrapped data key, so a
//! packet's ciphertext is simply a slice of that single stream; splitting the
//! stream differently would change nothing but the bulk framing.

use std::path::{Path, PathBuf};
use std::{fs, io::Read};

use byteorder::{BigEndian, ByteOrder};
use cipher::generic_array::GenericArray;
use cipher::KeyIvInit;

use crate::device::NetMd;
use crate::protocol::constants::{WireFormat, KEK, PACKET_IV, PACKET_KEY};
use crate::protocol::{Error, Transport};
use crate::secure::{cbc_encrypt_in_place, des_ecb_encrypt, DesCbcEncryptor, SecureSession};

/// Frames per bulk packet.
const PACKET_FRAMES: u64 = 2048;

/// One bulk packet of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The per-track data key as shipped, wrapped under the KEK.
    pub key: [u8; 8],
    /// The IV the track's cipher stream starts from.
    pub iv: [u8; 8],
    /// This packet's slice of the ciphertext stream.
    pub data: Vec<u8>,
}

impl Packet {
    /// Serializes the packet for the bulk pipe:
    /// `u64 length || key || iv || ciphertext`, with no padding.
    pub fn wire_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(24 + self.data.len());
        let mut length = [0u8; 8];
        BigEndian::write_u64(&mut length, self.data.len() as u64);
        frame.extend_from_slice(&length);
        frame.extend_from_slice(&self.key);
        frame.extend_from_slice(&self.iv);
        frame.extend_from_slice(&self.data);
        frame
    }
}

/// An audio track staged for download.
///
/// The file must already be in the wire format; for PCM that is raw
/// big-endian signed-16 samples. Titles are expected to be pre-cleaned
/// ASCII.
#[derive(Debug, Clone)]
pub struct Track {
    path: PathBuf,
    title: String,
    wire_format: WireFormat,
}

impl Track {
    /// Stages a track file under the given on-disc title.
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>, wire_format: WireFormat) -> Self {
        Track {
            path: path.into(),
            title: title.into(),
            wire_format,
        }
    }

    /// The source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The on-disc title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The encoding used on the USB link.
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// Number of whole frames in the source file.
    ///
    /// Files whose size is not a multiple of 8 lose their final frame; the
    /// device cannot take a trailing partial cipher block.
    pub fn frame_count(&self) -> Result<u64, Error> {
        let size = fs::metadata(&self.path)?.len();
        let frames = size / self.wire_format.frame_size() as u64;
        if size % 8 != 0 {
            Ok(frames.saturating_sub(1))
        } else {
            Ok(frames)
        }
    }

    /// Number of bulk packets the track will occupy.
    pub fn packet_count(&self) -> Result<u64, Error> {
        Ok(self.frame_count()?.div_ceil(PACKET_FRAMES))
    }

    /// Reads and encrypts the whole file as wire packets.
    pub fn read_packets(&self) -> Result<Vec<Packet>, Error> {
        let stream_key = des_ecb_encrypt(&KEK, &PACKET_KEY);
        let mut cipher = DesCbcEncryptor::new(
            GenericArray::from_slice(&stream_key),
            GenericArray::from_slice(&PACKET_IV),
        );

        let frame_size = self.wire_format.frame_size() as u64;
        let mut remaining = self.frame_count()?;
        let mut packets = Vec::with_capacity(self.packet_count()? as usize);
        let mut file = fs::File::open(&self.path)?;

        while remaining > 0 {
            let frames = remaining.min(PACKET_FRAMES);
            let mut data = vec![0u8; (frames * frame_size) as usize];
            file.read_exact(&mut data)?;
            cbc_encrypt_in_place(&mut cipher, &mut data);
            packets.push(Packet {
                key: PACKET_KEY,
                iv: PACKET_IV,
                data,
            });
            remaining -= frames;
        }
        Ok(packets)
    }
}

/// Outcome of one track download.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DownloadedTrack {
    /// Track number the recorder assigned.
    pub number: u16,
    /// The 8-byte DRM tracking ID written to the medium.
    pub uuid: [u8; 8],
    /// Content ID echoed back by the recorder.
    pub content_id: [u8; 20],
}

impl<T: Transport> SecureSession<'_, T> {
    /// Runs the full pipeline for one track inside this session.
    pub fn download(&mut self, track: &Track) -> Result<DownloadedTrack, Error> {
        self.setup_download()?;

        let wire_format = track.wire_format();
        let frames = u32::try_from(track.frame_count()?).map_err(|_| {
            Error::InvalidArgument(format!("{} is too large to download", track.path().display()))
        })?;
        let packets = track.read_packets()?;
        log::info!(
            "downloading \"{}\": {frames} frame(s) in {} packet(s)",
            track.title(),
            packets.len()
        );

        let (number, encrypted) =
            self.device_mut()
                .send_track(wire_format, wire_format.disk_format(), frames, &packets)?;

        let confirmation = self.decrypt_reply(&encrypted)?;
        if confirmation.len() < 32 {
            return Err(Error::Invalid(format!(
                "confirmation record of {} byte(s)",
                confirmation.len()
            )));
        }
        let mut uuid = [0u8; 8];
        uuid.copy_from_slice(&confirmation[..8]);
        let mut content_id = [0u8; 20];
        content_id.copy_from_slice(&confirmation[12..32]);

        self.device_mut().cache_toc()?;
        self.device_mut()
            .set_track_title(number, track.title().as_bytes(), false)?;
        self.device_mut().sync_toc()?;
        self.commit_track(number)?;
        log::info!("track {number} committed");

        Ok(DownloadedTrack {
            number,
            uuid,
            content_id,
        })
    }
}

/// Downloads a sequence of tracks within a single secure session.
///
/// The session is closed on the way out, error or not. Tracks are sent
/// strictly one after another.
pub fn download_tracks<T: Transport>(
    device: &mut NetMd<T>,
    tracks: &[Track],
) -> Result<Vec<DownloadedTrack>, Error> {
    let mut session = SecureSession::begin(device)?;
    let mut downloaded = Vec::with_capacity(tracks.len());
    for track in tracks {
        downloaded.push(session.download(track)?);
    }
    session.end();
    Ok(downloaded)
}

/// Downloads a single PCM track.
///
/// First asks the recorder to record it unprotected; recorders that cannot
/// do that keep their default protection and the download proceeds.
pub fn download_track<T: Transport>(
    device: &mut NetMd<T>,
    path: impl Into<PathBuf>,
    title: impl Into<String>,
) -> Result<DownloadedTrack, Error> {
    match device.disable_new_track_protection(1) {
        Ok(()) => {}
        Err(Error::NotImplemented) => {
            log::warn!("recorder keeps downloaded tracks protected");
        }
        Err(err) => return Err(err),
    }

    let track = Track::new(path, title, WireFormat::Pcm);
    let mut session = SecureSession::begin(device)?;
    let downloaded = session.download(&track)?;
    session.end();
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::protocol::query::{format_query, Value};
    use crate::protocol::test_util::ScriptedTransport;

    fn stage_file(size: usize, wire_format: WireFormat) -> (NamedTempFile, Track) {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&vec![0u8; size]).expect("test audio");
        let track = Track::new(file.path(), "Test Track", wire_format);
        (file, track)
    }

    #[test]
    fn frame_accounting() {
        let (_file, track) = stage_file(4096, WireFormat::Pcm);
        assert_eq!(track.frame_count().unwrap(), 2);

        // Misaligned files lose their trailing frame.
        let (_file, track) = stage_file(4097, WireFormat::Pcm);
        assert_eq!(track.frame_count().unwrap(), 1);

        let (_file, track) = stage_file(4104, WireFormat::Pcm);
        assert_eq!(track.frame_count().unwrap(), 2);

        let (_file, track) = stage_file(192 * 3, WireFormat::Lp2);
        assert_eq!(track.frame_count().unwrap(), 3);
        let (_file, track) = stage_file(192 * 3 + 1, WireFormat::Lp2);
        assert_eq!(track.frame_count().unwrap(), 2);
    }

    #[test]
    fn packet_boundary() {
        // Exactly k * 2048 frames: the last packet is full, never empty.
        let (_file, track) = stage_file(96 * 2048, WireFormat::Lp4);
        assert_eq!(track.packet_count().unwrap(), 1);
        let packets = track.read_packets().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 96 * 2048);

        let (_file, track) = stage_file(96 * 2049, WireFormat::Lp4);
        assert_eq!(track.packet_count().unwrap(), 2);
        let packets = track.read_packets().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data.len(), 96 * 2048);
        assert_eq!(packets[1].data.len(), 96);
    }

    #[test]
    fn packets_share_key_iv_and_stream() {
        let (_file, track) = stage_file(96 * 2049, WireFormat::Lp4);
        let packets = track.read_packets().unwrap();
        for packet in &packets {
            assert_eq!(packet.key, PACKET_KEY);
            assert_eq!(packet.iv, PACKET_IV);
        }
        let total: usize = packets.iter().map(|p| p.data.len()).sum();
        assert_eq!(total as u64, track.frame_count().unwrap() * 96);
    }

    #[test]
    fn wire_frame_header() {
        let packet = Packet {
            key: [0x96, 0x03, 0xc7, 0xc0, 0x53, 0x37, 0xd2, 0xf0],
            iv: [0x08, 0xd9, 0xcb, 0xd4, 0xc1, 0x5e, 0xc0, 0xff],
            data: vec![0; 262_144],
        };
        let frame = packet.wire_frame();
        assert_eq!(&frame[..8], &[0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00]);
        assert_eq!(&frame[8..16], &packet.key);
        assert_eq!(&frame[16..24], &packet.iv);
        assert_eq!(frame.len(), 24 + 262_144);
    }

    fn accepted(transport: &mut ScriptedTransport, pattern: &str, args: &[Value]) {
        transport.push_reply(0x09, &format_query(pattern, args).expect("test reply"));
    }

    #[test_log::test]
    fn full_upload_sequence() {
        let mut transport = ScriptedTransport::new();
        accepted(&mut transport, "1800 080046 f0030103 80 00", &[]);
        accepted(
            &mut transport,
            "1800 080046 f0030103 12 01 0000 00000000",
            &[],
        );
        accepted(
            &mut transport,
            "1800 080046 f0030103 20 00 000000 %*",
            &[[0x5a; 8].as_slice().into()],
        );
        accepted(&mut transport, "1800 080046 f0030103 22 00 0000", &[]);
        accepted(
            &mut transport,
            "1800 080046 f0030103 28 00 000100 1001 0000 00",
            &[],
        );
        accepted(
            &mut transport,
            "1800 080046 f0030103 28 00 000100 1001 %w 00 0000 00000000 00000000 %*",
            &[0u16.into(), [0u8; 32].as_slice().into()],
        );
        accepted(&mut transport, "1808 10180203 00", &[]); // cache_toc
        transport.push_reply(0x0a, &[]); // title probe: no title yet
        accepted(
            &mut transport,
            "1807 022018 02 0000 3000 0a00 5000 0000 0000 0000",
            &[],
        );
        accepted(&mut transport, "1808 10180200 00", &[]); // sync_toc
        accepted(&mut transport, "1800 080046 f0030103 48 00 00 1001 0000", &[]);
        accepted(&mut transport, "1800 080046 f0030103 21 00 000000", &[]);
        accepted(&mut transport, "1800 080046 f0030103 81 00", &[]);

        // Three seconds of 44.1 kHz stereo 16-bit PCM.
        let (_file, track) = stage_file(529_200, WireFormat::Pcm);
        let mut md = NetMd::new(transport);
        let downloaded = download_tracks(&mut md, &[track]).unwrap();

        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].number, 0);

        let transport = md.into_transport();
        assert!(transport.replies.is_empty());

        // 258 whole frames fit in one packet.
        assert_eq!(transport.bulk.len(), 1);
        assert_eq!(transport.bulk[0].len(), 24 + 258 * 2048);
        assert_eq!(
            &transport.bulk[0][..8],
            &[0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x10, 0x00]
        );

        // The control channel saw exactly this sequence, no repeats.
        let expected: &[&[u8]] = &[
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x80, 0xff], // enter
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x12, 0xff], // key data
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x20, 0xff], // nonces
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x22, 0xff], // setup
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x28, 0xff], // send track
            &[0x18, 0x08, 0x10, 0x18, 0x02, 0x03, 0x00],                         // cache TOC
            &[0x18, 0x06, 0x02, 0x20, 0x18, 0x02],                               // title probe
            &[0x18, 0x07, 0x02, 0x20, 0x18, 0x02],                               // set title
            &[0x18, 0x08, 0x10, 0x18, 0x02, 0x00, 0x00],                         // sync TOC
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x48, 0xff], // commit
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x21, 0xff], // forget
            &[0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x81, 0xff], // leave
        ];
        assert_eq!(transport.commands.len(), expected.len());
        for (command, prefix) in transport.commands.iter().zip(expected) {
            assert_eq!(command[0], 0x00);
            assert_eq!(&command[1..1 + prefix.len()], *prefix);
        }
    }

    #[test_log::test]
    fn single_track_download_tolerates_protected_recorders() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(0x08, &[]); // protection toggle unsupported
        accepted(&mut transport, "1800 080046 f0030103 80 00", &[]);
        accepted(
            &mut transport,
            "1800 080046 f0030103 12 01 0000 00000000",
            &[],
        );
        accepted(
            &mut transport,
            "1800 080046 f0030103 20 00 000000 %*",
            &[[0x5a; 8].as_slice().into()],
        );
        accepted(&mut transport, "1800 080046 f0030103 22 00 0000", &[]);
        accepted(
            &mut transport,
            "1800 080046 f0030103 28 00 000100 1001 0000 00",
            &[],
        );
        accepted(
            &mut transport,
            "1800 080046 f0030103 28 00 000100 1001 %w 00 0000 00000000 00000000 %*",
            &[7u16.into(), [0u8; 32].as_slice().into()],
        );
        accepted(&mut transport, "1808 10180203 00", &[]);
        transport.push_reply(0x0a, &[]);
        accepted(
            &mut transport,
            "1807 022018 02 0007 3000 0a00 5000 0000 0000 0000",
            &[],
        );
        accepted(&mut transport, "1808 10180200 00", &[]);
        accepted(&mut transport, "1800 080046 f0030103 48 00 00 1001 0000", &[]);
        accepted(&mut transport, "1800 080046 f0030103 21 00 000000", &[]);
        accepted(&mut transport, "1800 080046 f0030103 81 00", &[]);

        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&[0u8; 4096]).expect("test audio");

        let mut md = NetMd::new(transport);
        let downloaded = download_track(&mut md, file.path(), "Quiet").unwrap();
        assert_eq!(downloaded.number, 7);
    }
}
