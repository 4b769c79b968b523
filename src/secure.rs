//! The secure download session: EKB delivery, nonce exchange, and the
//! session-key lifecycle.
//!
//! Downloads only work inside a session keyed by both ends. The recorder
//! decrypts the root key out of the EKB, both sides exchange nonces, and the
//! session key is the retail MAC of the two nonces under the root key. The
//! key lives in RAM for the duration of the session and nowhere else.

use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use des::{Des, TdesEde2};
use rand::Rng as _;

use crate::device::NetMd;
use crate::protocol::constants::{CONTENT_ID, KEK, ROOT_KEY, ZERO_IV};
use crate::protocol::{Error, Transport};

pub(crate) type DesCbcEncryptor = cbc::Encryptor<Des>;
type DesCbcDecryptor = cbc::Decryptor<Des>;
type TdesCbcEncryptor = cbc::Encryptor<TdesEde2>;

/// Encrypts one 8-byte block with single DES in ECB mode.
pub(crate) fn des_ecb_encrypt(key: &[u8; 8], block: &[u8; 8]) -> [u8; 8] {
    let mut out = *block;
    Des::new(GenericArray::from_slice(key)).encrypt_block(GenericArray::from_mut_slice(&mut out));
    out
}

/// Encrypts a buffer in place under an already-initialized CBC context.
///
/// The buffer length must be a multiple of the DES block size.
pub(crate) fn cbc_encrypt_in_place(cipher: &mut DesCbcEncryptor, buf: &mut [u8]) {
    debug_assert_eq!(buf.len() % 8, 0);
    for block in buf.chunks_exact_mut(8) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Derives the 8-byte session key from the root key and both nonces.
///
/// This is the retail MAC over `host_nonce || device_nonce`: single DES-CBC
/// under the first half of the root key encrypts the host half, and its
/// output block seeds a two-key 3DES-CBC pass over the device half.
pub fn derive_session_key(
    root_key: &[u8; 16],
    host_nonce: &[u8; 8],
    device_nonce: &[u8; 8],
) -> [u8; 8] {
    let mut iv = *host_nonce;
    let mut stage1 = DesCbcEncryptor::new(
        GenericArray::from_slice(&root_key[..8]),
        GenericArray::from_slice(&ZERO_IV),
    );
    stage1.encrypt_block_mut(GenericArray::from_mut_slice(&mut iv));

    let mut key = *device_nonce;
    let mut stage2 = TdesCbcEncryptor::new(
        GenericArray::from_slice(root_key),
        GenericArray::from_slice(&iv),
    );
    stage2.encrypt_block_mut(GenericArray::from_mut_slice(&mut key));
    key
}

/// A secure download session on one recorder.
///
/// [`begin`](Self::begin) runs the key agreement. Dropping the guard, or
/// calling [`end`](Self::end), forgets the session key on the device and
/// leaves the secure state; teardown failures are logged and swallowed so
/// the device is always released.
#[derive(Debug)]
pub struct SecureSession<'a, T: Transport> {
    device: &'a mut NetMd<T>,
    key: Option<[u8; 8]>,
    open: bool,
}

impl<'a, T: Transport> SecureSession<'a, T> {
    /// Opens the secure session and derives the session key.
    ///
    /// On any handshake failure the device is returned to the insecure
    /// state before the error surfaces.
    pub fn begin(device: &'a mut NetMd<T>) -> Result<Self, Error> {
        let key = match Self::handshake(device) {
            Ok(key) => key,
            Err(err) => {
                best_effort_teardown(device);
                return Err(err);
            }
        };
        log::info!("secure session established");
        Ok(SecureSession {
            device,
            key: Some(key),
            open: true,
        })
    }

    fn handshake(device: &mut NetMd<T>) -> Result<[u8; 8], Error> {
        device.enter_secure_session()?;
        device.send_key_data()?;

        let mut host_nonce = [0u8; 8];
        rand::thread_rng().fill(&mut host_nonce[..]);
        let device_nonce = device.exchange_session_key(&host_nonce)?;
        Ok(derive_session_key(&ROOT_KEY, &host_nonce, &device_nonce))
    }

    /// Closes the session, forgetting the key on both ends.
    pub fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.key = None;
        best_effort_teardown(self.device);
        log::info!("secure session closed");
    }

    pub(crate) fn device_mut(&mut self) -> &mut NetMd<T> {
        self.device
    }

    fn session_key(&self) -> Result<[u8; 8], Error> {
        self.key
            .ok_or_else(|| Error::Invalid("secure session has no session key".into()))
    }

    /// Announces a download to the device.
    ///
    /// Ships the content ID and the KEK, encrypted under the session key.
    pub fn setup_download(&mut self) -> Result<(), Error> {
        let key = self.session_key()?;

        let mut message = [0u8; 32];
        message[..4].copy_from_slice(&[0x01; 4]);
        message[4..24].copy_from_slice(&CONTENT_ID);
        message[24..].copy_from_slice(&KEK);
        let mut cipher = DesCbcEncryptor::new(
            GenericArray::from_slice(&key),
            GenericArray::from_slice(&ZERO_IV),
        );
        cbc_encrypt_in_place(&mut cipher, &mut message);

        self.device.setup_download(&message)
    }

    /// Checks the license for a downloaded track out of the computer.
    pub fn commit_track(&mut self, track: u16) -> Result<(), Error> {
        let key = self.session_key()?;
        let authentication = des_ecb_encrypt(&key, &ZERO_IV);
        self.device.commit_track(track, &authentication)
    }

    /// Decrypts a device record sent under the session key.
    pub(crate) fn decrypt_reply(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() % 8 != 0 {
            return Err(Error::Invalid(format!(
                "encrypted record of {} byte(s) is not block-aligned",
                data.len()
            )));
        }
        let key = self.session_key()?;
        let mut out = data.to_vec();
        let mut cipher = DesCbcDecryptor::new(
            GenericArray::from_slice(&key),
            GenericArray::from_slice(&ZERO_IV),
        );
        for block in out.chunks_exact_mut(8) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }
}

impl<T: Transport> Drop for SecureSession<'_, T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn best_effort_teardown<T: Transport>(device: &mut NetMd<T>) {
    if let Err(err) = device.forget_session_key() {
        log::warn!("forgetting the session key failed: {err}");
    }
    if let Err(err) = device.leave_secure_session() {
        log::warn!("leaving the secure session failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::protocol::query::format_query;
    use crate::protocol::test_util::ScriptedTransport;

    #[test]
    fn session_key_is_deterministic() {
        let host = [0u8; 8];
        let device = [0u8; 8];
        let first = derive_session_key(&ROOT_KEY, &host, &device);
        let second = derive_session_key(&ROOT_KEY, &host, &device);
        assert_eq!(first, second);
        // DES of an all-zero block under a fixed key is never all zeros.
        assert_ne!(first, [0u8; 8]);
    }

    #[test]
    fn session_key_depends_on_both_nonces() {
        let base = derive_session_key(&ROOT_KEY, &[0; 8], &[0; 8]);
        assert_ne!(base, derive_session_key(&ROOT_KEY, &[1; 8], &[0; 8]));
        assert_ne!(base, derive_session_key(&ROOT_KEY, &[0; 8], &[1; 8]));
    }

    #[test]
    fn ecb_helper_roundtrips_nothing() {
        // Wrapping is a pure function of its inputs.
        let once = des_ecb_encrypt(&KEK, &[0x42; 8]);
        assert_eq!(once, des_ecb_encrypt(&KEK, &[0x42; 8]));
        assert_ne!(once, [0x42; 8]);
    }

    fn accepted(transport: &mut ScriptedTransport, pattern: &str) {
        transport.push_reply(0x09, &format_query(pattern, &[]).expect("test reply"));
    }

    #[test_log::test]
    fn failed_handshake_tears_down() {
        let mut transport = ScriptedTransport::new();
        accepted(&mut transport, "1800 080046 f0030103 80 00");
        accepted(&mut transport, "1800 080046 f0030103 12 01 0000 00000000");
        transport.push_reply(0x0a, &[]); // nonce exchange rejected
        accepted(&mut transport, "1800 080046 f0030103 21 00 000000");
        accepted(&mut transport, "1800 080046 f0030103 81 00");

        let mut md = NetMd::new(transport);
        assert_matches!(SecureSession::begin(&mut md), Err(Error::Rejected));

        let commands = &md.transport().commands;
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[3][10..12], [0x21, 0xff]);
        assert_eq!(commands[4][10..12], [0x81, 0xff]);
    }

    #[test_log::test]
    fn drop_closes_the_session() {
        let mut transport = ScriptedTransport::new();
        accepted(&mut transport, "1800 080046 f0030103 80 00");
        accepted(&mut transport, "1800 080046 f0030103 12 01 0000 00000000");
        let nonce_reply =
            format_query("1800 080046 f0030103 20 00 000000", &[]).expect("test reply");
        transport.push_reply(0x09, &[nonce_reply, vec![0x5a; 8]].concat());
        accepted(&mut transport, "1800 080046 f0030103 21 00 000000");
        accepted(&mut transport, "1800 080046 f0030103 81 00");

        let mut md = NetMd::new(transport);
        let session = SecureSession::begin(&mut md).unwrap();
        drop(session);

        let commands = &md.transport().commands;
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[3][10..12], [0x21, 0xff]);
        assert_eq!(commands[4][10..12], [0x81, 0xff]);
    }
}
