/*!
 * EAPOL-Key frame view
 *
 * A non-owning, bounds-checked view over the bytes of an EAPOL-Key frame.
 * All field accesses go through offsets validated once at construction;
 * the view never copies or owns the buffer.
 *
 * EAPOL-Key layout (offsets from the EAPOL version byte):
 *
 * ```text
 *  0  version          1  packet type        2  body length (BE16)
 *  4  descriptor type  5  key info (BE16)    7  key length (BE16)
 *  9  replay counter  17  key nonce         49  key IV
 * 65  key RSC         73  key ID            81  key MIC (16 bytes)
 * 97  key data length (BE16)                99  key data
 * ```
 */

use crate::error::{DecryptError, Result};

/// EAPOL packet type carrying key descriptors.
pub const EAPOL_KEY_PACKET_TYPE: u8 = 3;

/// RSN (WPA2) key descriptor type.
pub const KEY_DESCRIPTOR_RSN: u8 = 2;
/// Legacy WPA key descriptor type.
pub const KEY_DESCRIPTOR_WPA: u8 = 254;

/// Offset of the 128-bit MIC field from the start of the EAPOL frame.
pub const EAPOL_KEY_MIC_OFFSET: usize = 81;
pub const MIC_LEN: usize = 16;

/// Minimum EAPOL-Key frame length: 4-byte EAPOL header + 95-byte descriptor.
pub const EAPOL_KEY_MIN_LEN: usize = 99;

const NONCE_OFFSET: usize = 17;
const KEY_INFO_OFFSET: usize = 5;
const KEY_DATA_LEN_OFFSET: usize = 97;

// Key-information flag bits
const KEY_INFO_VERSION_MASK: u16 = 0x0007;
const KEY_INFO_PAIRWISE: u16 = 0x0008;
const KEY_INFO_ACK: u16 = 0x0080;
const KEY_INFO_MIC: u16 = 0x0100;
const KEY_INFO_SECURE: u16 = 0x0200;

/// Bounds-checked view over one EAPOL-Key frame.
#[derive(Debug, Clone, Copy)]
pub struct EapolKeyView<'a> {
    bytes: &'a [u8],
}

impl<'a> EapolKeyView<'a> {
    /// Validate and wrap a buffer that starts at the EAPOL version byte.
    ///
    /// Checks the packet type, descriptor type, the declared body length
    /// against the buffer, and that the key-data field fits.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < EAPOL_KEY_MIN_LEN {
            return Err(DecryptError::WrongSize);
        }
        if bytes[1] != EAPOL_KEY_PACKET_TYPE {
            return Err(DecryptError::NoData);
        }
        let body_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if 4 + body_len > bytes.len() || body_len < EAPOL_KEY_MIN_LEN - 4 {
            return Err(DecryptError::WrongSize);
        }
        let descriptor_type = bytes[4];
        if descriptor_type != KEY_DESCRIPTOR_RSN && descriptor_type != KEY_DESCRIPTOR_WPA {
            return Err(DecryptError::NoData);
        }
        // truncate trailing padding beyond the declared body
        let bytes = &bytes[..4 + body_len];

        let view = Self { bytes };
        if EAPOL_KEY_MIN_LEN + view.key_data_len() > bytes.len() {
            return Err(DecryptError::WrongSize);
        }
        Ok(view)
    }

    /// The exact frame bytes the MIC is computed over.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn key_info(&self) -> u16 {
        u16::from_be_bytes([self.bytes[KEY_INFO_OFFSET], self.bytes[KEY_INFO_OFFSET + 1]])
    }

    /// Descriptor version: 1 = HMAC-MD5/TKIP, 2 = HMAC-SHA1/CCMP.
    pub fn descriptor_version(&self) -> u8 {
        (self.key_info() & KEY_INFO_VERSION_MASK) as u8
    }

    pub fn is_pairwise(&self) -> bool {
        self.key_info() & KEY_INFO_PAIRWISE != 0
    }

    pub fn has_ack(&self) -> bool {
        self.key_info() & KEY_INFO_ACK != 0
    }

    pub fn has_mic(&self) -> bool {
        self.key_info() & KEY_INFO_MIC != 0
    }

    pub fn is_secure(&self) -> bool {
        self.key_info() & KEY_INFO_SECURE != 0
    }

    pub fn nonce(&self) -> [u8; 32] {
        self.bytes[NONCE_OFFSET..NONCE_OFFSET + 32]
            .try_into()
            .expect("nonce bounds checked at parse")
    }

    pub fn key_data_len(&self) -> usize {
        u16::from_be_bytes([
            self.bytes[KEY_DATA_LEN_OFFSET],
            self.bytes[KEY_DATA_LEN_OFFSET + 1],
        ]) as usize
    }
}
