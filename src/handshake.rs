/*!
 * WPA/WPA2 4-way handshake tracking
 *
 * Consumes EAPOL-Key messages for one security association and drives key
 * derivation and MIC verification. Message 2 is where candidate keys are
 * proven: each configured WPA key is expanded to a session key and checked
 * against the frame's MIC until one matches.
 *
 * State machine: 0 (unseen) -> 1 (message 1: nonce captured) -> 2
 * (message 2: PTK derived) -> 4 (message 4: complete). Message 3 is
 * acknowledged without a state change. Only states 2 and 4 make the
 * association eligible for data-frame decryption.
 */

use tracing::{debug, trace};

use crate::crypto::{derive_pmk, derive_ptk, verify_mic, PTK_BITS_CCMP, PTK_BITS_TKIP};
use crate::eapol::EapolKeyView;
use crate::error::{DecryptError, Result};
use crate::keys::{ConfiguredKey, Key, KeyStore};
use crate::sa::{HandshakeState, SaId, SecurityAssociation};

/// Process one EAPOL-Key message for the association identified by `id`.
///
/// `last_ssid` is the most recently observed broadcast SSID, substituted
/// for passphrase keys configured without one (wildcard matching).
///
/// Returns the association's state after the message; candidate-key
/// failures leave the association exactly as it was.
pub fn process_message(
    keys: &KeyStore,
    last_ssid: Option<&[u8]>,
    id: &SaId,
    sa: &mut SecurityAssociation,
    eapol: &EapolKeyView<'_>,
) -> Result<HandshakeState> {
    // Group-key messages are not tracked; only the pairwise handshake is.
    if !eapol.is_pairwise() {
        return Err(DecryptError::InvalidHandshake);
    }

    match (eapol.has_ack(), eapol.has_mic()) {
        // Message 1: capture the authenticator nonce and descriptor version.
        (true, false) => {
            sa.anonce = eapol.nonce();
            sa.descriptor_version = eapol.descriptor_version();
            sa.state = HandshakeState::NonceCaptured;
            trace!(version = sa.descriptor_version, "handshake message 1");
            Ok(sa.state)
        }

        // Message 2 or 4. The secure bit decides; when it is clear, some
        // supplicants send message 4 anyway, so fall back to the key-data
        // length (nonzero means message 2 carrying an RSN IE). That second
        // check is an interoperability workaround, not a protocol rule.
        (false, true) => {
            let is_message_4 = eapol.is_secure() || eapol.key_data_len() == 0;
            if is_message_4 {
                sa.state = HandshakeState::Complete;
                trace!("handshake message 4");
                Ok(sa.state)
            } else {
                verify_message_2(keys, last_ssid, id, sa, eapol)
            }
        }

        // Message 3: acknowledged, nothing new to learn from it.
        (true, true) => {
            trace!("handshake message 3");
            Ok(sa.state)
        }

        (false, false) => Err(DecryptError::InvalidHandshake),
    }
}

/// Try every candidate WPA key against message 2's MIC.
///
/// The association's already-confirmed key is tried first, then the
/// configured list in order. The first key whose derived session key
/// verifies the MIC is cached on the association.
fn verify_message_2(
    keys: &KeyStore,
    last_ssid: Option<&[u8]>,
    id: &SaId,
    sa: &mut SecurityAssociation,
    eapol: &EapolKeyView<'_>,
) -> Result<HandshakeState> {
    let version = eapol.descriptor_version();
    let bits = match version {
        1 => PTK_BITS_TKIP,
        2 => PTK_BITS_CCMP,
        v => return Err(DecryptError::UnsupportedDescriptorVersion(v)),
    };
    let snonce = eapol.nonce();

    let cached = sa.key.iter();
    let configured = keys.keys().iter().filter(|c| c.key.is_wpa());

    for candidate in cached.chain(configured) {
        let pmk = match resolve_pmk(candidate, last_ssid) {
            Some(pmk) => pmk,
            None => continue,
        };

        let ptk = derive_ptk(&pmk, &id.bssid, &id.sta, &sa.anonce, &snonce, bits);
        if verify_mic(ptk.kck(), eapol.bytes(), version)? {
            debug!(version, "message 2 MIC verified, caching key");
            let confirmed = candidate.clone();
            sa.key = Some(ConfiguredKey {
                pmk: Some(pmk),
                ..confirmed
            });
            sa.ptk = Some(ptk);
            sa.descriptor_version = version;
            sa.state = HandshakeState::PtkDerived;
            return Ok(sa.state);
        }
        trace!("candidate key rejected by MIC");
    }

    Err(DecryptError::NoKeyMatched)
}

/// The master key for a candidate: pre-computed when possible, derived on
/// the fly for wildcard passphrases using the last observed SSID.
fn resolve_pmk(candidate: &ConfiguredKey, last_ssid: Option<&[u8]>) -> Option<[u8; 32]> {
    if let Some(pmk) = candidate.pmk {
        return Some(pmk);
    }
    match &candidate.key {
        Key::WpaPsk(pmk) => Some(*pmk),
        Key::WpaPassphrase { passphrase, ssid } => {
            let ssid: &[u8] = if ssid.is_empty() { last_ssid? } else { ssid };
            Some(derive_pmk(passphrase, ssid))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_mic;
    use crate::eapol::{EAPOL_KEY_MIC_OFFSET, EAPOL_KEY_PACKET_TYPE, KEY_DESCRIPTOR_RSN, MIC_LEN};

    const BSSID: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
    const STA: [u8; 6] = [0xa0, 0xb0, 0xc0, 0xd0, 0xe0, 0xf0];

    fn sa_id() -> SaId {
        SaId { bssid: BSSID, sta: STA }
    }

    fn key_frame(key_info: u16, nonce: &[u8; 32], key_data: &[u8]) -> Vec<u8> {
        let body_len = 95 + key_data.len();
        let mut f = vec![0u8; 4 + body_len];
        f[0] = 0x01;
        f[1] = EAPOL_KEY_PACKET_TYPE;
        f[2..4].copy_from_slice(&(body_len as u16).to_be_bytes());
        f[4] = KEY_DESCRIPTOR_RSN;
        f[5..7].copy_from_slice(&key_info.to_be_bytes());
        f[17..49].copy_from_slice(nonce);
        f[97..99].copy_from_slice(&(key_data.len() as u16).to_be_bytes());
        f[99..].copy_from_slice(key_data);
        f
    }

    /// Message 2 with a MIC computed from the given passphrase and SSID.
    fn message_2(anonce: &[u8; 32], snonce: &[u8; 32], passphrase: &str, ssid: &[u8]) -> Vec<u8> {
        let mut f = key_frame(0x010a, snonce, &[0xdd; 22]);
        let pmk = derive_pmk(passphrase, ssid);
        let ptk = derive_ptk(&pmk, &BSSID, &STA, anonce, snonce, PTK_BITS_CCMP);
        let mic = compute_mic(ptk.kck(), &f, 2).unwrap();
        f[EAPOL_KEY_MIC_OFFSET..EAPOL_KEY_MIC_OFFSET + MIC_LEN].copy_from_slice(&mic);
        f
    }

    fn store(passphrase: &str, ssid: &[u8]) -> KeyStore {
        let mut keys = KeyStore::new();
        keys.set_keys(&[Key::WpaPassphrase {
            passphrase: passphrase.into(),
            ssid: ssid.to_vec(),
        }])
        .unwrap();
        keys
    }

    #[test]
    fn test_full_handshake_progression() {
        let keys = store("password", b"IEEE");
        let mut sa = SecurityAssociation::default();
        let anonce = [0x3c; 32];
        let snonce = [0x5e; 32];

        // message 1: ack, pairwise, version 2
        let m1 = key_frame(0x008a, &anonce, &[]);
        let view = EapolKeyView::parse(&m1).unwrap();
        let state = process_message(&keys, None, &sa_id(), &mut sa, &view).unwrap();
        assert_eq!(state, HandshakeState::NonceCaptured);
        assert_eq!(sa.anonce, anonce);
        assert_eq!(sa.descriptor_version, 2);

        // message 2: mic, pairwise, carrying an RSN IE
        let m2 = message_2(&anonce, &snonce, "password", b"IEEE");
        let view = EapolKeyView::parse(&m2).unwrap();
        let state = process_message(&keys, None, &sa_id(), &mut sa, &view).unwrap();
        assert_eq!(state, HandshakeState::PtkDerived);
        assert!(sa.ptk.is_some());
        assert!(sa.key.is_some());
        assert!(sa.can_decrypt());

        // message 3: ack + mic, no state change
        let m3 = key_frame(0x13ca, &anonce, &[0xdd; 22]);
        let view = EapolKeyView::parse(&m3).unwrap();
        let state = process_message(&keys, None, &sa_id(), &mut sa, &view).unwrap();
        assert_eq!(state, HandshakeState::PtkDerived);

        // message 4: mic + secure, empty key data
        let m4 = key_frame(0x030a, &[0u8; 32], &[]);
        let view = EapolKeyView::parse(&m4).unwrap();
        let state = process_message(&keys, None, &sa_id(), &mut sa, &view).unwrap();
        assert_eq!(state, HandshakeState::Complete);
    }

    #[test]
    fn test_wrong_passphrase_leaves_state_untouched() {
        let keys = store("not-the-password", b"IEEE");
        let mut sa = SecurityAssociation::default();
        let anonce = [0x3c; 32];
        let snonce = [0x5e; 32];

        let m1 = key_frame(0x008a, &anonce, &[]);
        process_message(&keys, None, &sa_id(), &mut sa, &EapolKeyView::parse(&m1).unwrap())
            .unwrap();

        let m2 = message_2(&anonce, &snonce, "password", b"IEEE");
        let err = process_message(
            &keys,
            None,
            &sa_id(),
            &mut sa,
            &EapolKeyView::parse(&m2).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err, DecryptError::NoKeyMatched);
        assert_eq!(sa.state, HandshakeState::NonceCaptured);
        assert!(sa.ptk.is_none());
        assert!(sa.key.is_none());
    }

    #[test]
    fn test_wildcard_ssid_uses_last_observed() {
        let keys = store("password", b""); // wildcard
        let mut sa = SecurityAssociation::default();
        let anonce = [0x11; 32];
        let snonce = [0x22; 32];

        let m1 = key_frame(0x008a, &anonce, &[]);
        process_message(&keys, Some(b"IEEE"), &sa_id(), &mut sa, &EapolKeyView::parse(&m1).unwrap())
            .unwrap();

        let m2 = message_2(&anonce, &snonce, "password", b"IEEE");
        let state = process_message(
            &keys,
            Some(b"IEEE"),
            &sa_id(),
            &mut sa,
            &EapolKeyView::parse(&m2).unwrap(),
        )
        .unwrap();
        assert_eq!(state, HandshakeState::PtkDerived);

        // no observed SSID: the wildcard candidate cannot be expanded
        let mut fresh = SecurityAssociation::default();
        process_message(&keys, None, &sa_id(), &mut fresh, &EapolKeyView::parse(&m1).unwrap())
            .unwrap();
        let err = process_message(
            &keys,
            None,
            &sa_id(),
            &mut fresh,
            &EapolKeyView::parse(&m2).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err, DecryptError::NoKeyMatched);
    }

    #[test]
    fn test_message_4_with_secure_clear_heuristic() {
        let keys = store("password", b"IEEE");
        let mut sa = SecurityAssociation::default();

        // mic set, secure clear, zero key data: treated as message 4
        let m4 = key_frame(0x010a, &[0u8; 32], &[]);
        let state = process_message(
            &keys,
            None,
            &sa_id(),
            &mut sa,
            &EapolKeyView::parse(&m4).unwrap(),
        )
        .unwrap();
        assert_eq!(state, HandshakeState::Complete);
    }

    #[test]
    fn test_group_key_message_rejected() {
        let keys = store("password", b"IEEE");
        let mut sa = SecurityAssociation::default();

        // ack without the pairwise bit: group-key handshake
        let m = key_frame(0x0082, &[0u8; 32], &[]);
        let err = process_message(
            &keys,
            None,
            &sa_id(),
            &mut sa,
            &EapolKeyView::parse(&m).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err, DecryptError::InvalidHandshake);
        assert_eq!(sa.state, HandshakeState::Unseen);
    }

    #[test]
    fn test_psk_key_matches_passphrase_derivation() {
        let pmk = derive_pmk("password", b"IEEE");
        let mut keys = KeyStore::new();
        keys.set_keys(&[Key::WpaPsk(pmk)]).unwrap();

        let mut sa = SecurityAssociation::default();
        let anonce = [0x3c; 32];
        let snonce = [0x5e; 32];

        let m1 = key_frame(0x008a, &anonce, &[]);
        process_message(&keys, None, &sa_id(), &mut sa, &EapolKeyView::parse(&m1).unwrap())
            .unwrap();

        let m2 = message_2(&anonce, &snonce, "password", b"IEEE");
        let state = process_message(
            &keys,
            None,
            &sa_id(),
            &mut sa,
            &EapolKeyView::parse(&m2).unwrap(),
        )
        .unwrap();
        assert_eq!(state, HandshakeState::PtkDerived);
    }
}
