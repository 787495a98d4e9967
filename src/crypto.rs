/*!
 * WPA/WPA2 key derivation and MIC verification
 *
 * Implements the cryptographic orchestration used by the handshake tracker:
 * - PMK (Pairwise Master Key) derivation using PBKDF2-HMAC-SHA1
 * - PTK (Pairwise Transient Key) derivation using the 802.11i PRF
 * - MIC (Message Integrity Code) calculation and verification
 *
 * References:
 * - IEEE 802.11i-2004 standard
 * - RFC 2898 (PBKDF2)
 */

use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2;
use sha1::Sha1;

use crate::eapol::{EAPOL_KEY_MIC_OFFSET, MIC_LEN};
use crate::error::{DecryptError, Result};

type HmacSha1 = Hmac<Sha1>;
type HmacMd5 = Hmac<Md5>;

/// Constant for PRF expansion
const PRF_LABEL: &[u8] = b"Pairwise key expansion";

/// PTK length in bits for CCMP (KCK | KEK | 128-bit temporal key).
pub const PTK_BITS_CCMP: usize = 384;
/// PTK length in bits for TKIP (KCK | KEK | temporal key | Michael keys).
pub const PTK_BITS_TKIP: usize = 512;

/// Derive the PMK (Pairwise Master Key) from a passphrase and SSID
///
/// PMK = PBKDF2-HMAC-SHA1(passphrase, SSID, 4096 iterations, 256 bits)
///
/// This is the expensive step: 4096 HMAC-SHA1 iterations per output block.
/// The key store pre-computes it at configuration time whenever the SSID is
/// known up front.
///
/// # Arguments
/// * `passphrase` - WPA passphrase (8-63 characters)
/// * `ssid` - Network SSID (used as salt)
///
/// # Returns
/// 32-byte PMK
pub fn derive_pmk(passphrase: &str, ssid: &[u8]) -> [u8; 32] {
    let mut pmk = [0u8; 32];
    // 32-byte output can never exceed the PBKDF2 length limit
    let _ = pbkdf2::<Hmac<Sha1>>(passphrase.as_bytes(), ssid, 4096, &mut pmk);
    pmk
}

/// Derived session key material, 384 bits for CCMP or 512 for TKIP.
///
/// Layout: key-confirmation key (16 bytes), key-encryption key (16 bytes,
/// unused by a passive decrypter), temporal key (remainder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ptk {
    bytes: [u8; 64],
    len: usize,
}

impl Ptk {
    /// Key-confirmation key, used for EAPOL MIC verification.
    pub fn kck(&self) -> &[u8] {
        &self.bytes[0..16]
    }

    /// Temporal key, used for TKIP/CCMP frame decryption.
    pub fn tk(&self) -> &[u8] {
        &self.bytes[32..48]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Derive the PTK (Pairwise Transient Key) from the PMK and handshake data
///
/// PTK = PRF-X(PMK, "Pairwise key expansion",
///             min(AA, SPA) || max(AA, SPA) || min(ANonce, SNonce) || max(ANonce, SNonce))
///
/// The min/max ordering is mandatory: it makes the derivation symmetric, so
/// both peers compute identical bytes no matter which side is "first".
///
/// # Arguments
/// * `pmk` - Pairwise Master Key
/// * `bssid` - AP MAC address
/// * `sta` - Station MAC address
/// * `nonce_a` / `nonce_b` - The two peers' nonces, in either order
/// * `bits` - [`PTK_BITS_CCMP`] or [`PTK_BITS_TKIP`]
pub fn derive_ptk(
    pmk: &[u8; 32],
    bssid: &[u8; 6],
    sta: &[u8; 6],
    nonce_a: &[u8; 32],
    nonce_b: &[u8; 32],
    bits: usize,
) -> Ptk {
    // min(AA, SPA) || max(AA, SPA) || min(ANonce, SNonce) || max(ANonce, SNonce)
    let mut data = [0u8; 76]; // 6 + 6 + 32 + 32

    let (lo_mac, hi_mac) = if bssid < sta { (bssid, sta) } else { (sta, bssid) };
    data[0..6].copy_from_slice(lo_mac);
    data[6..12].copy_from_slice(hi_mac);

    let (lo_nonce, hi_nonce) = if nonce_a < nonce_b {
        (nonce_a, nonce_b)
    } else {
        (nonce_b, nonce_a)
    };
    data[12..44].copy_from_slice(lo_nonce);
    data[44..76].copy_from_slice(hi_nonce);

    prf(pmk, PRF_LABEL, &data, bits)
}

/// PRF-X as defined in IEEE 802.11i: HMAC-SHA1 blocks over a fixed
/// 100-byte input of label || 0x00 || data || counter.
fn prf(key: &[u8], label: &[u8], data: &[u8], bits: usize) -> Ptk {
    let mut out = [0u8; 80]; // up to 4 blocks of 20 bytes

    let mut input = [0u8; 100];
    let mut pos = 0;
    input[pos..pos + label.len()].copy_from_slice(label);
    pos += label.len();
    input[pos] = 0;
    pos += 1;
    input[pos..pos + data.len()].copy_from_slice(data);
    pos += data.len();
    let counter_pos = pos;
    let input_len = pos + 1;

    let blocks = (bits + 159) / 160;
    for i in 0..blocks {
        input[counter_pos] = i as u8;

        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(&input[..input_len]);
        let hash = mac.finalize().into_bytes();
        out[i * 20..i * 20 + 20].copy_from_slice(&hash);
    }

    let len = bits / 8;
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&out[..64]);
    Ptk { bytes, len }
}

/// Calculate the MIC over an EAPOL frame (whose MIC field is zeroed)
///
/// MIC = HMAC-MD5(KCK, frame)            (descriptor version 1)
/// MIC = HMAC-SHA1(KCK, frame)[0..16]    (descriptor version 2)
///
/// Any other version is a hard failure.
pub fn compute_mic(kck: &[u8], eapol_frame: &[u8], descriptor_version: u8) -> Result<[u8; 16]> {
    let mut result = [0u8; 16];

    match descriptor_version {
        1 => {
            let mut mac = HmacMd5::new_from_slice(kck).expect("HMAC can take key of any size");
            mac.update(eapol_frame);
            result.copy_from_slice(&mac.finalize().into_bytes());
        }
        2 => {
            let mut mac = HmacSha1::new_from_slice(kck).expect("HMAC can take key of any size");
            mac.update(eapol_frame);
            let hash = mac.finalize().into_bytes();
            result.copy_from_slice(&hash[..16]);
        }
        v => return Err(DecryptError::UnsupportedDescriptorVersion(v)),
    }

    Ok(result)
}

/// Verify the embedded MIC of a full EAPOL frame
///
/// Copies out the 128-bit MIC at its fixed offset, zeroes the field in a
/// working copy, recomputes over the whole frame and compares. Any single
/// bit flipped outside the MIC field must make this fail.
pub fn verify_mic(kck: &[u8], eapol_frame: &[u8], descriptor_version: u8) -> Result<bool> {
    if eapol_frame.len() < EAPOL_KEY_MIC_OFFSET + MIC_LEN {
        return Err(DecryptError::WrongSize);
    }

    let mut work = eapol_frame.to_vec();
    let mut embedded = [0u8; 16];
    embedded.copy_from_slice(&work[EAPOL_KEY_MIC_OFFSET..EAPOL_KEY_MIC_OFFSET + MIC_LEN]);
    work[EAPOL_KEY_MIC_OFFSET..EAPOL_KEY_MIC_OFFSET + MIC_LEN].fill(0);

    let computed = compute_mic(kck, &work, descriptor_version)?;

    let mut diff = 0u8;
    for i in 0..16 {
        diff |= computed[i] ^ embedded[i];
    }
    Ok(diff == 0)
}
