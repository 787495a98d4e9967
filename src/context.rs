/*!
 * Decryption context and per-frame dispatcher
 *
 * `Dot11DecryptContext` owns everything the engine remembers between
 * frames: the configured candidate keys, the security-association cache
 * and the last broadcast SSID seen by the host. One context per decoding
 * session; it is not internally synchronized, so a host sharing it across
 * threads must serialize access itself.
 *
 * `process_frame` is the single entry point: it classifies a captured
 * 802.11 data frame, feeds cleartext EAPOL frames to the handshake
 * tracker, and decrypts protected payloads in place using cached or
 * brute-forced keys.
 */

use tracing::debug;

use crate::cipher;
use crate::eapol::{EapolKeyView, EAPOL_KEY_MIN_LEN};
use crate::error::{DecryptError, Result};
use crate::frame::{
    extract_addresses, is_data_frame, is_protected, EXT_IV_FLAG, LLC_8021X_SIGNATURE,
    MIN_MAC_HEADER_LEN,
};
use crate::handshake;
use crate::keys::{ConfiguredKey, Key, KeyStore, MAX_SSID_LEN};
use crate::sa::{SaId, SaTable, SecurityAssociation};

/// What `process_frame` should attempt.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    /// Track EAPOL-Key handshake messages found in cleartext frames.
    pub scan_handshakes: bool,
    /// Decrypt protected frames in place.
    pub decrypt: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            scan_handshakes: true,
            decrypt: true,
        }
    }
}

/// Successful outcomes of `process_frame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The payload was decrypted in place with this key; the cipher header
    /// and trailer are gone and the protection bit is cleared.
    Decrypted { key: Key },
    /// The frame advanced (or re-confirmed) a 4-way handshake.
    Handshake { state: crate::sa::HandshakeState },
}

/// Decryption engine state for one decoding session.
#[derive(Debug, Default)]
pub struct Dot11DecryptContext {
    keys: KeyStore,
    sas: SaTable,
    last_ssid: Option<Vec<u8>>,
}

impl Dot11DecryptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured candidate keys. See [`KeyStore::set_keys`].
    pub fn set_keys(&mut self, candidates: &[Key]) -> Result<usize> {
        self.keys.set_keys(candidates)
    }

    /// The configured keys, validated and in order.
    pub fn keys(&self) -> &[ConfiguredKey] {
        self.keys.keys()
    }

    /// Record the most recently observed broadcast SSID, used to expand
    /// passphrase keys configured without one. Oversized SSIDs are ignored.
    pub fn set_last_ssid(&mut self, ssid: &[u8]) {
        if ssid.len() > MAX_SSID_LEN {
            tracing::warn!(len = ssid.len(), "ignoring oversized SSID");
            return;
        }
        self.last_ssid = Some(ssid.to_vec());
    }

    /// Inspect the security association for a (BSSID, station) pair.
    pub fn association(&self, id: &SaId) -> Option<&SecurityAssociation> {
        self.sas.get(id)
    }

    pub fn association_count(&self) -> usize {
        self.sas.len()
    }

    /// Drop all keys, associations and the cached SSID.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.sas.clear();
        self.last_ssid = None;
    }

    /// Process one captured 802.11 frame.
    ///
    /// `frame` holds the full frame starting at the frame-control field;
    /// `mac_header_len` is the length of its MAC header (24-32 bytes
    /// depending on the DS bits and QoS). On successful decryption the
    /// buffer is shrunk in place; on any error it is untouched.
    pub fn process_frame(
        &mut self,
        frame: &mut Vec<u8>,
        mac_header_len: usize,
        opts: &ProcessOptions,
    ) -> Result<FrameOutcome> {
        // smallest processable frame: MAC header plus the WEP header, one
        // payload byte and the ICV
        let min_len = mac_header_len + cipher::WEP_HEADER_LEN + 1 + cipher::WEP_ICV_LEN;
        if mac_header_len < MIN_MAC_HEADER_LEN || frame.len() < min_len {
            return Err(DecryptError::WrongSize);
        }
        if !is_data_frame(frame[0]) {
            return Err(DecryptError::NoData);
        }

        let (sta, bssid) =
            extract_addresses(&frame[..mac_header_len]).ok_or(DecryptError::MoreDataNeeded)?;
        let id = SaId { bssid, sta };

        if !is_protected(frame[1]) {
            if !opts.scan_handshakes {
                return Err(DecryptError::NoData);
            }
            return self.track_handshake(frame, mac_header_len, id);
        }

        if !opts.decrypt {
            return Err(DecryptError::NoData);
        }

        let sa = self.sas.get_or_insert(id)?;
        if frame[mac_header_len + 3] & EXT_IV_FLAG == 0 {
            Self::decrypt_wep(&self.keys, sa, frame, mac_header_len)
        } else {
            Self::decrypt_wpa(sa, frame, mac_header_len)
        }
    }

    /// Cleartext path: require the 802.1X LLC signature and a well-formed
    /// EAPOL-Key descriptor, then hand the message to the state machine.
    fn track_handshake(
        &mut self,
        frame: &[u8],
        mac_header_len: usize,
        id: SaId,
    ) -> Result<FrameOutcome> {
        let llc_end = mac_header_len + LLC_8021X_SIGNATURE.len();
        if frame.len() < llc_end + EAPOL_KEY_MIN_LEN {
            return Err(DecryptError::NoData);
        }
        if frame[mac_header_len..llc_end] != LLC_8021X_SIGNATURE {
            return Err(DecryptError::NoData);
        }

        let view = EapolKeyView::parse(&frame[llc_end..])?;
        let sa = self.sas.get_or_insert(id)?;
        let state =
            handshake::process_message(&self.keys, self.last_ssid.as_deref(), &id, sa, &view)?;
        Ok(FrameOutcome::Handshake { state })
    }

    /// WEP path: brute-force the configured WEP keys, the association's
    /// cached key first, and cache whichever one decrypts cleanly.
    fn decrypt_wep(
        keys: &KeyStore,
        sa: &mut SecurityAssociation,
        frame: &mut Vec<u8>,
        mac_header_len: usize,
    ) -> Result<FrameOutcome> {
        let mut candidates: Vec<ConfiguredKey> = Vec::new();
        if let Some(cached) = &sa.key {
            if cached.key.is_wep() {
                candidates.push(cached.clone());
            }
        }
        candidates.extend(keys.keys().iter().filter(|c| c.key.is_wep()).cloned());

        for candidate in candidates {
            let Key::Wep(key_bytes) = &candidate.key else {
                continue;
            };
            match cipher::wep_decrypt(frame, mac_header_len, key_bytes) {
                Ok(()) => {
                    frame[1] &= !0x40;
                    debug!("WEP key matched, caching on association");
                    let key = candidate.key.clone();
                    sa.key = Some(candidate);
                    return Ok(FrameOutcome::Decrypted { key });
                }
                Err(DecryptError::IntegrityFailure) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DecryptError::NoKeyMatched)
    }

    /// TKIP/CCMP path: requires a completed-enough handshake (state 2 or 4)
    /// on the association; uses the temporal-key slice of the session key.
    fn decrypt_wpa(
        sa: &mut SecurityAssociation,
        frame: &mut Vec<u8>,
        mac_header_len: usize,
    ) -> Result<FrameOutcome> {
        if !sa.can_decrypt() {
            return Err(DecryptError::NoKeyMatched);
        }
        // resolve everything fallible before touching the frame
        let (Some(ptk), Some(confirmed)) = (&sa.ptk, &sa.key) else {
            return Err(DecryptError::NoKeyMatched);
        };
        let key = confirmed.key.clone();

        match sa.descriptor_version {
            1 => cipher::tkip_decrypt(frame, mac_header_len, ptk.tk())?,
            2 => cipher::ccmp_decrypt(frame, mac_header_len, ptk.tk())?,
            v => return Err(DecryptError::UnsupportedDescriptorVersion(v)),
        }
        frame[1] &= !0x40;
        Ok(FrameOutcome::Decrypted { key })
    }
}
