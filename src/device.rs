//! High-level interface to a NetMD recorder.
//!
//! Track numbering starts at 0. The first position of a track is
//! 0:00:00.1 (hours, minutes, seconds, frames of 1/512 s). Wide-character
//! titles are passed through as caller-encoded bytes.

use num_traits::FromPrimitive as _;

use crate::download::Packet;
use crate::protocol::bcd::{bcd_to_int, int_to_bcd};
use crate::protocol::constants::{DiscFlags, DiskFormat, EkbData, WireFormat, EKB};
use crate::protocol::query::{format_query, parse_response, Value};
use crate::protocol::{Error, Status, Transport, REQUEST_CONTROL};

const ACTION_PLAY: u8 = 0x75;
const ACTION_PAUSE: u8 = 0x7d;
const ACTION_FAST_FORWARD: u8 = 0x39;
const ACTION_REWIND: u8 = 0x49;

const TRACK_PREVIOUS: u16 = 0x0002;
const TRACK_NEXT: u16 = 0x8001;
const TRACK_RESTART: u16 = 0x0001;

/// A position within a track, in the device's time coordinates.
///
/// Frames are 1/512 of a second.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TrackTime {
    /// Hours.
    pub hours: u16,
    /// Minutes.
    pub minutes: u8,
    /// Seconds.
    pub seconds: u8,
    /// Frames of 1/512 s.
    pub frames: u8,
}

/// The three capacity figures reported for a disc.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiscCapacity {
    /// Duration already recorded.
    pub recorded: TrackTime,
    /// Total disc duration at the current recording parameters.
    pub total: TrackTime,
    /// Remaining disc duration at the current recording parameters.
    pub available: TrackTime,
}

/// The playback head position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TrackPosition {
    /// Current track number.
    pub track: u16,
    /// Position within the track.
    pub time: TrackTime,
}

/// A NetMD recorder driven over a [`Transport`].
#[derive(Debug)]
pub struct NetMd<T> {
    transport: T,
}

impl<T> NetMd<T> {
    /// Wraps a transport in the command layer.
    pub fn new(transport: T) -> Self {
        NetMd { transport }
    }

    /// Borrows the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the handle, returning the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: Transport> NetMd<T> {
    fn send_query(&mut self, pattern: &str, args: &[Value]) -> Result<Vec<u8>, Error> {
        let query = format_query(pattern, args)?;
        let mut command = Vec::with_capacity(query.len() + 1);
        command.push(REQUEST_CONTROL);
        command.extend_from_slice(&query);
        log::trace!("-> {command:02x?}");
        self.transport.send_command(&command)?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<Vec<u8>, Error> {
        let reply = self.transport.read_reply()?;
        log::trace!("<- {reply:02x?}");
        let status = *reply
            .first()
            .ok_or_else(|| Error::Invalid("empty reply".into()))?;
        match Status::from_u8(status) {
            Some(Status::Accepted | Status::Implemented | Status::Interim) => {
                Ok(reply[1..].to_vec())
            }
            Some(Status::NotImplemented) => Err(Error::NotImplemented),
            Some(Status::Rejected) => Err(Error::Rejected),
            _ => Err(Error::Invalid(format!(
                "unknown response status {status:#04x}"
            ))),
        }
    }

    //
    // Disc-wide controls
    //

    /// Erases the disc, unconditionally.
    ///
    /// Does not check for track protection of any kind.
    pub fn erase_disc(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1840 ff 0000", &[])?;
        parse_response("1840 00 0000", &reply)?;
        Ok(())
    }

    /// Flushes the cached TOC to the disc.
    pub fn sync_toc(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1808 10180200 00", &[])?;
        parse_response("1808 10180200 00", &reply)?;
        Ok(())
    }

    /// Loads the TOC into the device cache for editing.
    pub fn cache_toc(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1808 10180203 00", &[])?;
        parse_response("1808 10180203 00", &reply)?;
        Ok(())
    }

    //
    // Playback controls
    //

    fn playback_action(&mut self, action: u8) -> Result<(), Error> {
        let reply = self.send_query("18c3 ff %b 000000", &[action.into()])?;
        parse_response("18c3 00 %b 000000", &reply)?;
        Ok(())
    }

    /// Starts playback.
    pub fn play(&mut self) -> Result<(), Error> {
        self.playback_action(ACTION_PLAY)
    }

    /// Pauses playback.
    pub fn pause(&mut self) -> Result<(), Error> {
        self.playback_action(ACTION_PAUSE)
    }

    /// Fast-forwards.
    pub fn fast_forward(&mut self) -> Result<(), Error> {
        self.playback_action(ACTION_FAST_FORWARD)
    }

    /// Rewinds.
    pub fn rewind(&mut self) -> Result<(), Error> {
        self.playback_action(ACTION_REWIND)
    }

    /// Stops playback.
    pub fn stop(&mut self) -> Result<(), Error> {
        let reply = self.send_query("18c5 ff 00000000", &[])?;
        parse_response("18c5 00 00000000", &reply)?;
        Ok(())
    }

    fn change_track(&mut self, direction: u16) -> Result<(), Error> {
        let reply = self.send_query("1850 ff10 00000000 %w", &[direction.into()])?;
        parse_response("1850 0010 00000000 %?%?", &reply)?;
        Ok(())
    }

    /// Seeks to the beginning of the next track.
    pub fn switch_next_track(&mut self) -> Result<(), Error> {
        self.change_track(TRACK_NEXT)
    }

    /// Seeks to the beginning of the previous track.
    pub fn switch_previous_track(&mut self) -> Result<(), Error> {
        self.change_track(TRACK_PREVIOUS)
    }

    /// Seeks back to the beginning of the current track.
    pub fn restart_track(&mut self) -> Result<(), Error> {
        self.change_track(TRACK_RESTART)
    }

    /// Seeks to the beginning of the given track.
    pub fn go_to_track(&mut self, track: u16) -> Result<u16, Error> {
        let reply = self.send_query("1850 ff010000 0000 %w", &[track.into()])?;
        let values = parse_response("1850 00010000 0000 %w", &reply)?;
        let [track] = fields(values)?;
        Ok(track.int()? as u16)
    }

    /// Seeks to the given time within the given track.
    pub fn go_to_time(&mut self, track: u16, time: TrackTime) -> Result<(), Error> {
        let reply = self.send_query(
            "1850 ff000000 0000 %w %b%b%b%b",
            &[
                track.into(),
                int_to_bcd(time.hours.into(), 1)?.into(),
                int_to_bcd(time.minutes.into(), 1)?.into(),
                int_to_bcd(time.seconds.into(), 1)?.into(),
                int_to_bcd(time.frames.into(), 1)?.into(),
            ],
        )?;
        parse_response("1850 00000000 %?%? %w %b%b%b%b", &reply)?;
        Ok(())
    }

    //
    // Titling
    //

    /// Returns the disc title, in the encoding it was written in.
    ///
    /// ASCII titles come back as ASCII; wide titles come back byte for byte,
    /// with decoding left to the caller. On grouped discs the disc title
    /// lives in the first group entry, attached to the imaginary track 0;
    /// the grouping syntax is stripped.
    pub fn get_disc_title(&mut self, wchar: bool) -> Result<Vec<u8>, Error> {
        let raw = self.raw_disc_title(wchar)?;
        Ok(ungroup_title(raw))
    }

    /// The title as stored, chunked out of the device 10 bytes at a time.
    fn raw_disc_title(&mut self, wchar: bool) -> Result<Vec<u8>, Error> {
        let wchar_value: u8 = if wchar { 1 } else { 0 };
        let mut title = Vec::new();
        let mut done: u64 = 0;
        let mut remaining: u64 = 0;
        let mut total: u64 = 1;

        while done < total {
            let reply = self.send_query(
                "1806 02201801 00%b 3000 0a00 ff00 %w%w",
                &[
                    wchar_value.into(),
                    Value::Int(remaining),
                    Value::Int(done),
                ],
            )?;

            let (chunk_size, chunk) = if remaining == 0 {
                let values = parse_response(
                    "1806 02201801 00%? 3000 0a00 1000 %w0000 %?%?000a %w %*",
                    &reply,
                )?;
                let [size, new_total, chunk] = fields(values)?;
                total = new_total.int()?;
                let size = size.int()?.checked_sub(6).ok_or_else(|| {
                    Error::Invalid("title chunk shorter than its own header".into())
                })?;
                (size, chunk.into_bytes()?)
            } else {
                let values = parse_response(
                    "1806 02201801 00%? 3000 0a00 1000 %w%?%? %*",
                    &reply,
                )?;
                let [size, chunk] = fields(values)?;
                (size.int()?, chunk.into_bytes()?)
            };

            if chunk_size != chunk.len() as u64 {
                return Err(Error::Invalid(format!(
                    "title chunk of {} byte(s) announced as {chunk_size}",
                    chunk.len()
                )));
            }
            done += chunk_size;
            remaining = total.saturating_sub(done);
            title.extend_from_slice(&chunk);
        }
        Ok(title)
    }

    /// Sets the disc title.
    ///
    /// The device replaces titles in place, so the current title's length
    /// rides along with the new one.
    pub fn set_disc_title(&mut self, title: &[u8], wchar: bool) -> Result<(), Error> {
        let wchar_value: u8 = if wchar { 1 } else { 0 };
        let old_len = self.raw_disc_title(false)?.len();
        let reply = self.send_query(
            "1807 02201801 00%b 3000 0a00 5000 %w 0000 %w %*",
            &[
                wchar_value.into(),
                wire_length(title.len())?.into(),
                wire_length(old_len)?.into(),
                title.into(),
            ],
        )?;
        parse_response("1807 02201801 00%? 3000 0a00 5000 %?%? 0000 %?%?", &reply)?;
        Ok(())
    }

    /// Returns the given track's title, in the encoding it was written in.
    ///
    /// Wide titles come back byte for byte, with decoding left to the
    /// caller.
    pub fn get_track_title(&mut self, track: u16, wchar: bool) -> Result<Vec<u8>, Error> {
        let wchar_value: u8 = if wchar { 3 } else { 2 };
        let reply = self.send_query(
            "1806 022018%b %w 3000 0a00 ff00 00000000",
            &[wchar_value.into(), track.into()],
        )?;
        let values = parse_response(
            "1806 022018%? %?%? %?%? %?%? 1000 00%?0000 00%?000a %x",
            &reply,
        )?;
        let [title] = fields(values)?;
        title.into_bytes()
    }

    /// Sets the given track's title.
    ///
    /// A rejected title read means the track has no title yet; its old
    /// length is taken as zero.
    pub fn set_track_title(&mut self, track: u16, title: &[u8], wchar: bool) -> Result<(), Error> {
        let wchar_value: u8 = if wchar { 3 } else { 2 };
        let old_len = match self.get_track_title(track, false) {
            Ok(old) => old.len(),
            Err(Error::Rejected) => 0,
            Err(err) => return Err(err),
        };
        let reply = self.send_query(
            "1807 022018%b %w 3000 0a00 5000 %w 0000 %w %*",
            &[
                wchar_value.into(),
                track.into(),
                wire_length(title.len())?.into(),
                wire_length(old_len)?.into(),
                title.into(),
            ],
        )?;
        parse_response("1807 022018%? %?%? 3000 0a00 5000 %?%? 0000 %?%?", &reply)?;
        Ok(())
    }

    //
    // Disc status
    //

    /// Raw device status record; most of its content is undocumented.
    pub fn get_status(&mut self) -> Result<Vec<u8>, Error> {
        let reply = self.send_query("1809 8001 0230 8800 0030 8804 00 ff00 00000000", &[])?;
        let values = parse_response(
            "1809 8001 0230 8800 0030 8804 00 1000 0009 0000 %x",
            &reply,
        )?;
        let [status] = fields(values)?;
        status.into_bytes()
    }

    /// Whether a disc is loaded.
    pub fn is_disc_present(&mut self) -> Result<bool, Error> {
        let status = self.get_status()?;
        Ok(status.get(4) == Some(&0x40))
    }

    fn disc_flags(&mut self) -> Result<DiscFlags, Error> {
        let reply = self.send_query("1806 01101000 ff00 0001000b", &[])?;
        let values = parse_response("1806 01101000 1000 0001000b %b", &reply)?;
        let [flags] = fields(values)?;
        Ok(DiscFlags::from_bits_truncate(flags.int()? as u8))
    }

    /// Whether the loaded disc accepts recording.
    pub fn is_disc_writable(&mut self) -> Result<bool, Error> {
        Ok(self.disc_flags()?.contains(DiscFlags::WRITABLE))
    }

    /// Whether the loaded disc's write-protect tab is closed.
    pub fn is_disc_write_protected(&mut self) -> Result<bool, Error> {
        Ok(self.disc_flags()?.contains(DiscFlags::WRITE_PROTECTED))
    }

    /// Number of tracks on the disc.
    pub fn get_track_count(&mut self) -> Result<u16, Error> {
        let reply = self.send_query("1806 02101001 3000 1000 ff00 00000000", &[])?;
        let values = parse_response("1806 02101001 %?%? %?%? 1000 00%?0000 %x", &reply)?;
        let [data] = fields(values)?;
        let data = data.into_bytes()?;
        if data.len() != 6 || data[..5] != [0x00, 0x10, 0x00, 0x02, 0x00] {
            return Err(Error::Invalid(format!(
                "malformed track-count record {data:02x?}"
            )));
        }
        Ok(data[5].into())
    }

    /// Duration of the given track.
    pub fn get_track_length(&mut self, track: u16) -> Result<TrackTime, Error> {
        let record = self.track_info(track, 0x3000, 0x0100)?;
        let values = parse_response("0001 0006 0000 %b %b %b %b", &record)?;
        let [hours, minutes, seconds, frames] = fields(values)?;
        Ok(track_time(
            hours.int()?,
            minutes.int()?,
            seconds.int()?,
            frames.int()?,
        ))
    }

    fn track_info(&mut self, track: u16, p1: u16, p2: u16) -> Result<Vec<u8>, Error> {
        let reply = self.send_query(
            "1806 02201001 %w %w %w ff00 00000000",
            &[track.into(), p1.into(), p2.into()],
        )?;
        let values = parse_response("1806 02201001 %?%? %?%? %?%? 1000 00%?0000 %x", &reply)?;
        let [record] = fields(values)?;
        record.into_bytes()
    }

    /// The recorded, total, and available durations of the disc.
    ///
    /// The latter two depend on the current recording parameters.
    pub fn get_disc_capacity(&mut self) -> Result<DiscCapacity, Error> {
        let reply = self.send_query("1806 02101000 3080 0300 ff00 00000000", &[])?;
        let values = parse_response(
            "1806 02101000 3080 0300 1000 001d0000 001b 8003 0017 8000 \
             0005 %w %b %b %b 0005 %w %b %b %b 0005 %w %b %b %b",
            &reply,
        )?;
        let [rh, rm, rs, rf, th, tm, ts, tf, ah, am, asec, af] = fields(values)?;
        Ok(DiscCapacity {
            recorded: track_time(rh.int()?, rm.int()?, rs.int()?, rf.int()?),
            total: track_time(th.int()?, tm.int()?, ts.int()?, tf.int()?),
            available: track_time(ah.int()?, am.int()?, asec.int()?, af.int()?),
        })
    }

    /// Current playback position, or `None` when no disc is loaded.
    pub fn get_track_position(&mut self) -> Result<Option<TrackPosition>, Error> {
        let reply = match self.send_query(
            "1809 8001 0430 8802 0030 8805 0030 0003 0030 0002 00 ff00 00000000",
            &[],
        ) {
            Ok(reply) => reply,
            Err(Error::Rejected) => return Ok(None),
            Err(err) => return Err(err),
        };
        let values = parse_response(
            "1809 8001 0430 %?%? %?%? %?%? %?%? %?%? %?%? %?%? %? %?00 00%?0000 \
             000b 0002 0007 00 %w %b %b %b %b",
            &reply,
        )?;
        let [track, hours, minutes, seconds, frames] = fields(values)?;
        Ok(Some(TrackPosition {
            track: track.int()? as u16,
            time: track_time(hours.int()?, minutes.int()?, seconds.int()?, frames.int()?),
        }))
    }

    /// The 8-byte DRM tracking ID stored on the medium for a downloaded
    /// track, used to verify its identity at check-in.
    pub fn get_track_uuid(&mut self, track: u16) -> Result<[u8; 8], Error> {
        let reply = self.send_query("1800 080046 f0030103 23 ff 1001 %w", &[track.into()])?;
        let values = parse_response("1800 080046 f0030103 23 00 1001 %?%? %*", &reply)?;
        let [uuid] = fields(values)?;
        fixed_bytes(&uuid, "track UUID")
    }

    //
    // Track editing
    //

    /// Removes a track from the disc.
    pub fn erase_track(&mut self, track: u16) -> Result<(), Error> {
        let reply = self.send_query("1840 ff01 00 201001 %w", &[track.into()])?;
        parse_response("1840 1001 00 201001 %?%?", &reply)?;
        Ok(())
    }

    /// Moves a track to a new position.
    pub fn move_track(&mut self, source: u16, dest: u16) -> Result<(), Error> {
        let reply = self.send_query(
            "1843 ff00 00 201001 00 %w 201001 %w",
            &[source.into(), dest.into()],
        )?;
        parse_response("1843 0000 00 201001 00 %?%? 201001 %?%?", &reply)?;
        Ok(())
    }

    //
    // Secure session primitives
    //

    /// Enters a session secured by the root key of an EKB. The EKB itself is
    /// delivered afterwards with [`send_key_data`](Self::send_key_data).
    pub fn enter_secure_session(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1800 080046 f0030103 80 ff", &[])?;
        parse_response("1800 080046 f0030103 80 00", &reply)?;
        Ok(())
    }

    /// Leaves the secure session, discarding the root key on the device.
    pub fn leave_secure_session(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1800 080046 f0030103 81 ff", &[])?;
        parse_response("1800 080046 f0030103 81 00", &reply)?;
        Ok(())
    }

    /// Reads the device's leaf ID, identifying which keys of the EKB tree
    /// the device holds.
    pub fn get_leaf_id(&mut self) -> Result<[u8; 8], Error> {
        let reply = self.send_query("1800 080046 f0030103 11 ff", &[])?;
        let values = parse_response("1800 080046 f0030103 11 00 %*", &reply)?;
        let [leaf_id] = fields(values)?;
        fixed_bytes(&leaf_id, "leaf ID")
    }

    /// Delivers the EKB. The device uses its built-in key set to decrypt the
    /// root key out of the chain.
    pub fn send_key_data(&mut self) -> Result<(), Error> {
        let EkbData {
            id,
            chain,
            depth,
            signature,
        } = EKB;
        if !(1..=63).contains(&depth) {
            return Err(Error::InvalidArgument(format!(
                "EKB depth {depth} out of range"
            )));
        }

        let chain_bytes: Vec<u8> = chain.iter().flatten().copied().collect();
        // 16-byte parameter header, the key chain, the signature.
        let data_bytes = (16 + chain_bytes.len() + signature.len()) as u64;
        let reply = self.send_query(
            "1800 080046 f0030103 12 ff %w %d %d %d %d 00000000 %* %*",
            &[
                Value::Int(data_bytes),
                Value::Int(data_bytes),
                (chain.len() as u32).into(),
                depth.into(),
                id.into(),
                chain_bytes.into(),
                (&signature).into(),
            ],
        )?;
        parse_response("1800 080046 f0030103 12 01 %?%? %?%?%?%?", &reply)?;
        Ok(())
    }

    /// Exchanges nonces with the device. Requires the root key to have been
    /// delivered with [`send_key_data`](Self::send_key_data).
    pub fn exchange_session_key(&mut self, host_nonce: &[u8; 8]) -> Result<[u8; 8], Error> {
        let reply = self.send_query(
            "1800 080046 f0030103 20 ff 000000 %*",
            &[host_nonce.into()],
        )?;
        let values = parse_response("1800 080046 f0030103 20 00 000000 %*", &reply)?;
        let [nonce] = fields(values)?;
        fixed_bytes(&nonce, "device nonce")
    }

    /// Invalidates the session key established by the nonce exchange. The
    /// root key delivered by the EKB stays in effect.
    pub fn forget_session_key(&mut self) -> Result<(), Error> {
        let reply = self.send_query("1800 080046 f0030103 21 ff 000000", &[])?;
        parse_response("1800 080046 f0030103 21 00 000000", &reply)?;
        Ok(())
    }

    /// Announces a download, shipping the session-key-encrypted content ID
    /// and KEK.
    pub fn setup_download(&mut self, encrypted: &[u8; 32]) -> Result<(), Error> {
        let reply = self.send_query("1800 080046 f0030103 22 ff 0000 %*", &[encrypted.into()])?;
        parse_response("1800 080046 f0030103 22 00 0000", &reply)?;
        Ok(())
    }

    /// Marks a downloaded track's license as checked out of the computer.
    pub fn commit_track(&mut self, track: u16, authentication: &[u8; 8]) -> Result<(), Error> {
        let reply = self.send_query(
            "1800 080046 f0030103 48 ff 00 1001 %w %*",
            &[track.into(), authentication.into()],
        )?;
        parse_response("1800 080046 f0030103 48 00 00 1001 %?%?", &reply)?;
        Ok(())
    }

    /// Sends a track's header and packets, returning the assigned track
    /// number and the still-encrypted confirmation record.
    pub fn send_track(
        &mut self,
        wire_format: WireFormat,
        disk_format: DiskFormat,
        frames: u32,
        packets: &[Packet],
    ) -> Result<(u16, Vec<u8>), Error> {
        let total_bytes =
            wire_format.frame_size() as u64 * u64::from(frames) + packets.len() as u64 * 24;
        log::debug!(
            "sending {frames} frame(s) in {} packet(s), {total_bytes} byte(s) on the wire",
            packets.len()
        );

        let reply = self.send_query(
            "1800 080046 f0030103 28 ff 000100 1001 ffff 00 %b %b %d %d",
            &[
                (wire_format as u8).into(),
                (disk_format as u8).into(),
                frames.into(),
                Value::Int(total_bytes),
            ],
        )?;
        parse_response("1800 080046 f0030103 28 00 000100 1001 %?%? 00 %*", &reply)?;

        for packet in packets {
            self.transport.write_bulk(&packet.wire_frame())?;
        }

        let reply = self.read_reply()?;
        // One extra length probe clears the device's transfer state.
        self.transport.reply_length()?;

        let values = parse_response(
            "1800 080046 f0030103 28 00 000100 1001 %w 00 %?%? %?%?%?%? %?%?%?%? %*",
            &reply,
        )?;
        let [track, encrypted] = fields(values)?;
        Ok((track.int()? as u16, encrypted.into_bytes()?))
    }

    /// Asks later recorders to record the coming downloads unprotected, the
    /// way Simple Burner does. Reset to protecting when the secure session
    /// ends.
    pub fn disable_new_track_protection(&mut self, value: u16) -> Result<(), Error> {
        let reply = self.send_query("1800 080046 f0030103 2b ff %w", &[value.into()])?;
        parse_response("1800 080046 f0030103 2b 00 %?%?", &reply)?;
        Ok(())
    }
}

fn fields<const N: usize>(values: Vec<Value>) -> Result<[Value; N], Error> {
    values
        .try_into()
        .map_err(|values: Vec<Value>| {
            Error::Invalid(format!("unexpected field count {} in response", values.len()))
        })
}

fn fixed_bytes<const N: usize>(value: &Value, what: &str) -> Result<[u8; N], Error> {
    let bytes = value.bytes()?;
    bytes
        .try_into()
        .map_err(|_| Error::Invalid(format!("{what} of {} byte(s), expected {N}", bytes.len())))
}

fn wire_length(length: usize) -> Result<u16, Error> {
    u16::try_from(length)
        .map_err(|_| Error::InvalidArgument(format!("title of {length} bytes is too long")))
}

fn track_time(hours: u64, minutes: u64, seconds: u64, frames: u64) -> TrackTime {
    TrackTime {
        hours: bcd_to_int(hours) as u16,
        minutes: bcd_to_int(minutes) as u8,
        seconds: bcd_to_int(seconds) as u8,
        frames: bcd_to_int(frames) as u8,
    }
}

fn ungroup_title(title: Vec<u8>) -> Vec<u8> {
    match title.windows(2).position(|sep| sep == b"//") {
        Some(pos) => {
            let first = &title[..pos];
            if let Some(disc_title) = first.strip_prefix(b"0;".as_slice()) {
                disc_title.to_vec()
            } else if title.ends_with(b"//") {
                Vec::new()
            } else {
                title
            }
        }
        None => title,
    }
}
