/*!
 * In-place payload stripping for WEP, TKIP and CCMP
 *
 * Each routine decrypts into a scratch buffer, verifies integrity, and only
 * then rewrites the caller's frame: a failed decryption never leaves the
 * buffer partially modified. On success the cipher header and trailer are
 * removed, so the frame ends as MAC header || plaintext payload.
 *
 * AES-CCM comes from the `ccm`/`aes` crates; the WEP/TKIP integrity check
 * value is plain CRC32 (`crc32fast`). TKIP per-packet key mixing follows
 * IEEE 802.11i-2004 §8.3.2.5.
 */

use std::sync::OnceLock;

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::AeadInPlace;
use ccm::consts::{U13, U8};
use ccm::{Ccm, KeyInit};

use crate::error::{DecryptError, Result};
use crate::frame::is_qos_data;
use crate::rc4::Rc4;

type Aes128Ccm = Ccm<Aes128, U8, U13>;

/// WEP: 3-byte IV + key-ID byte before the payload, 4-byte ICV after.
pub const WEP_HEADER_LEN: usize = 4;
pub const WEP_ICV_LEN: usize = 4;

/// TKIP: 8-byte IV/Extended-IV header, 8-byte Michael MIC + 4-byte ICV trailer.
pub const TKIP_HEADER_LEN: usize = 8;
pub const TKIP_TRAILER_LEN: usize = 12;

/// CCMP: 8-byte PN/Extended-IV header, 8-byte MIC trailer.
pub const CCMP_HEADER_LEN: usize = 8;
pub const CCMP_MIC_LEN: usize = 8;

/// Decrypt a WEP-protected frame in place with one candidate key.
///
/// The RC4 key is IV || key. The ICV is the CRC32 of the plaintext,
/// appended little-endian and encrypted along with it; a mismatch reports
/// [`DecryptError::IntegrityFailure`] and leaves the frame untouched.
/// On success the frame shrinks by 8 bytes (IV/key-ID header + ICV).
pub fn wep_decrypt(frame: &mut Vec<u8>, header_len: usize, key: &[u8]) -> Result<()> {
    if frame.len() < header_len + WEP_HEADER_LEN + 1 + WEP_ICV_LEN {
        return Err(DecryptError::WrongSize);
    }

    let iv = &frame[header_len..header_len + 3];
    let mut rc4_key = Vec::with_capacity(3 + key.len());
    rc4_key.extend_from_slice(iv);
    rc4_key.extend_from_slice(key);

    let mut scratch = frame[header_len + WEP_HEADER_LEN..].to_vec();
    Rc4::with_key(&rc4_key).xor_keystream(&mut scratch);

    let plain_len = scratch.len() - WEP_ICV_LEN;
    if !icv_matches(&scratch, plain_len) {
        return Err(DecryptError::IntegrityFailure);
    }

    frame.truncate(header_len);
    frame.extend_from_slice(&scratch[..plain_len]);
    Ok(())
}

/// Decrypt a TKIP-protected frame in place using the 16-byte temporal key.
///
/// The per-packet RC4 key comes from the two-phase TKIP mixing of the
/// temporal key, the transmitter address (addr2) and the sequence counter
/// carried in the IV/Extended-IV header. The ICV covers plaintext plus the
/// Michael MIC; the Michael MIC itself is not re-verified, it is simply
/// stripped with the trailer. On success the frame shrinks by 20 bytes.
pub fn tkip_decrypt(frame: &mut Vec<u8>, header_len: usize, tk: &[u8]) -> Result<()> {
    if frame.len() < header_len + TKIP_HEADER_LEN + TKIP_TRAILER_LEN + 1 {
        return Err(DecryptError::WrongSize);
    }
    let tk: &[u8; 16] = tk.try_into().map_err(|_| DecryptError::WrongSize)?;

    let ta: [u8; 6] = frame[10..16].try_into().expect("header bounds checked");
    let iv = &frame[header_len..header_len + TKIP_HEADER_LEN];
    let iv16 = u16::from_be_bytes([iv[0], iv[2]]);
    let iv32 = u32::from_le_bytes([iv[4], iv[5], iv[6], iv[7]]);

    let p1k = tkip_phase1(tk, &ta, iv32);
    let rc4_key = tkip_phase2(tk, &p1k, iv16);

    let mut scratch = frame[header_len + TKIP_HEADER_LEN..].to_vec();
    Rc4::with_key(&rc4_key).xor_keystream(&mut scratch);

    let icv_start = scratch.len() - WEP_ICV_LEN;
    if !icv_matches(&scratch, icv_start) {
        return Err(DecryptError::IntegrityFailure);
    }

    frame.truncate(header_len);
    frame.extend_from_slice(&scratch[..icv_start + WEP_ICV_LEN - TKIP_TRAILER_LEN]);
    Ok(())
}

/// Decrypt a CCMP-protected frame in place using the 16-byte temporal key.
///
/// AES-CCM with an 8-byte tag and 13-byte nonce (priority || addr2 || PN);
/// the additional authenticated data is the masked MAC header. On success
/// the frame shrinks by 16 bytes (CCMP header + MIC).
pub fn ccmp_decrypt(frame: &mut Vec<u8>, header_len: usize, tk: &[u8]) -> Result<()> {
    if frame.len() < header_len + CCMP_HEADER_LEN + CCMP_MIC_LEN + 1 {
        return Err(DecryptError::WrongSize);
    }
    if tk.len() != 16 {
        return Err(DecryptError::WrongSize);
    }

    let hdr = &frame[header_len..header_len + CCMP_HEADER_LEN];
    let pn = [hdr[7], hdr[6], hdr[5], hdr[4], hdr[1], hdr[0]];
    let a2: [u8; 6] = frame[10..16].try_into().expect("header bounds checked");
    let priority = if is_qos_data(frame[0]) {
        frame[header_len - 2] & 0x0f
    } else {
        0
    };

    let nonce = ccmp_nonce(priority, &a2, &pn);
    let aad = ccmp_aad(&frame[..header_len]);

    let tag_start = frame.len() - CCMP_MIC_LEN;
    let mut scratch = frame[header_len + CCMP_HEADER_LEN..tag_start].to_vec();
    let tag = GenericArray::clone_from_slice(&frame[tag_start..]);

    let cipher = Aes128Ccm::new(GenericArray::from_slice(tk));
    cipher
        .decrypt_in_place_detached(GenericArray::from_slice(&nonce), &aad, &mut scratch, &tag)
        .map_err(|_| DecryptError::IntegrityFailure)?;

    frame.truncate(header_len);
    frame.extend_from_slice(&scratch);
    Ok(())
}

/// CCM nonce: priority || transmitter address || packet number (big-endian).
pub(crate) fn ccmp_nonce(priority: u8, a2: &[u8; 6], pn: &[u8; 6]) -> [u8; 13] {
    let mut nonce = [0u8; 13];
    nonce[0] = priority;
    nonce[1..7].copy_from_slice(a2);
    nonce[7..13].copy_from_slice(pn);
    nonce
}

/// CCM additional authenticated data: the MAC header with the mutable bits
/// masked out (retry/power/more-data cleared, protected set, QoS subtype
/// bits cleared, sequence number zeroed keeping the fragment number).
pub(crate) fn ccmp_aad(header: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(30);

    let mut fc0 = header[0];
    if is_qos_data(fc0) {
        fc0 &= 0x8f;
    }
    let fc1 = (header[1] & !(0x08 | 0x10 | 0x20)) | 0x40;
    aad.push(fc0);
    aad.push(fc1);
    aad.extend_from_slice(&header[4..22]); // addr1, addr2, addr3
    aad.push(header[22] & 0x0f); // fragment number only
    aad.push(0);

    let has_a4 = header[1] & 0x03 == 0x03;
    if has_a4 && header.len() >= 30 {
        aad.extend_from_slice(&header[24..30]);
    }
    if is_qos_data(header[0]) {
        aad.push(header[header.len() - 2] & 0x0f);
        aad.push(0);
    }
    aad
}

fn icv_matches(scratch: &[u8], icv_start: usize) -> bool {
    let expected = u32::from_le_bytes(
        scratch[icv_start..icv_start + 4]
            .try_into()
            .expect("four ICV bytes"),
    );
    crc32fast::hash(&scratch[..icv_start]) == expected
}

// --- TKIP per-packet key mixing (IEEE 802.11i-2004 §8.3.2.5) ---

fn mk16(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

/// The TKIP S-box lookup: Sbox1 indexed by the low byte XORed with the
/// byte-swapped table indexed by the high byte.
fn sbox(v: u16) -> u16 {
    let table = tkip_sbox();
    table[(v & 0xff) as usize] ^ table[(v >> 8) as usize].rotate_left(8)
}

/// TKIP S-box table, derived from the AES S-box: entry i is
/// (2·S[i] << 8) | (3·S[i]) over GF(2^8).
fn tkip_sbox() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let s = aes_sbox(i as u8);
            let x2 = xtime(s);
            *entry = mk16(x2, x2 ^ s);
        }
        table
    })
}

/// GF(2^8) doubling with the AES reduction polynomial.
fn xtime(b: u8) -> u8 {
    (b << 1) ^ if b & 0x80 != 0 { 0x1b } else { 0 }
}

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut acc = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            acc ^= a;
        }
        a = xtime(a);
        b >>= 1;
    }
    acc
}

/// AES S-box value: multiplicative inverse in GF(2^8) plus the affine map.
fn aes_sbox(v: u8) -> u8 {
    let inv = if v == 0 {
        0
    } else {
        // v^254 = v^-1 in GF(2^8)
        let mut acc = 1u8;
        for _ in 0..254 {
            acc = gf_mul(acc, v);
        }
        acc
    };
    inv ^ inv.rotate_left(1) ^ inv.rotate_left(2) ^ inv.rotate_left(3) ^ inv.rotate_left(4) ^ 0x63
}

/// Phase 1: mix the temporal key, transmitter address and the upper 32 bits
/// of the sequence counter into five 16-bit words.
pub(crate) fn tkip_phase1(tk: &[u8; 16], ta: &[u8; 6], iv32: u32) -> [u16; 5] {
    let mut p = [
        (iv32 & 0xffff) as u16,
        (iv32 >> 16) as u16,
        mk16(ta[1], ta[0]),
        mk16(ta[3], ta[2]),
        mk16(ta[5], ta[4]),
    ];

    for i in 0..8u16 {
        let j = (2 * (i & 1)) as usize;
        p[0] = p[0].wrapping_add(sbox(p[4] ^ mk16(tk[1 + j], tk[j])));
        p[1] = p[1].wrapping_add(sbox(p[0] ^ mk16(tk[5 + j], tk[4 + j])));
        p[2] = p[2].wrapping_add(sbox(p[1] ^ mk16(tk[9 + j], tk[8 + j])));
        p[3] = p[3].wrapping_add(sbox(p[2] ^ mk16(tk[13 + j], tk[12 + j])));
        p[4] = p[4]
            .wrapping_add(sbox(p[3] ^ mk16(tk[1 + j], tk[j])))
            .wrapping_add(i);
    }
    p
}

/// Phase 2: mix in the low 16 bits of the sequence counter and produce the
/// 16-byte per-packet RC4 key.
pub(crate) fn tkip_phase2(tk: &[u8; 16], p1k: &[u16; 5], iv16: u16) -> [u8; 16] {
    let mut ppk = [p1k[0], p1k[1], p1k[2], p1k[3], p1k[4], p1k[4].wrapping_add(iv16)];

    ppk[0] = ppk[0].wrapping_add(sbox(ppk[5] ^ mk16(tk[1], tk[0])));
    ppk[1] = ppk[1].wrapping_add(sbox(ppk[0] ^ mk16(tk[3], tk[2])));
    ppk[2] = ppk[2].wrapping_add(sbox(ppk[1] ^ mk16(tk[5], tk[4])));
    ppk[3] = ppk[3].wrapping_add(sbox(ppk[2] ^ mk16(tk[7], tk[6])));
    ppk[4] = ppk[4].wrapping_add(sbox(ppk[3] ^ mk16(tk[9], tk[8])));
    ppk[5] = ppk[5].wrapping_add(sbox(ppk[4] ^ mk16(tk[11], tk[10])));

    ppk[0] = ppk[0].wrapping_add((ppk[5] ^ mk16(tk[13], tk[12])).rotate_right(1));
    ppk[1] = ppk[1].wrapping_add((ppk[0] ^ mk16(tk[15], tk[14])).rotate_right(1));
    ppk[2] = ppk[2].wrapping_add(ppk[1].rotate_right(1));
    ppk[3] = ppk[3].wrapping_add(ppk[2].rotate_right(1));
    ppk[4] = ppk[4].wrapping_add(ppk[3].rotate_right(1));
    ppk[5] = ppk[5].wrapping_add(ppk[4].rotate_right(1));

    let mut key = [0u8; 16];
    key[0] = (iv16 >> 8) as u8;
    key[1] = ((iv16 >> 8) as u8 | 0x20) & 0x7f;
    key[2] = iv16 as u8;
    key[3] = ((ppk[5] ^ mk16(tk[1], tk[0])) >> 1) as u8;
    for i in 0..6 {
        key[4 + 2 * i] = ppk[i] as u8;
        key[5 + 2 * i] = (ppk[i] >> 8) as u8;
    }
    key
}
