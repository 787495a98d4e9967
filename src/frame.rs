/*!
 * 802.11 MAC header helpers
 *
 * Frame-control bit accessors and the FromDS/ToDS address extractor used to
 * key the security-association cache.
 */

/// LLC/SNAP signature preceding an 802.1X (EAPOL) payload.
pub const LLC_8021X_SIGNATURE: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];

/// Extended-IV flag in the key-ID byte: set for TKIP/CCMP, clear for WEP.
pub const EXT_IV_FLAG: u8 = 0x20;

/// Shortest MAC header that carries addr1..addr3.
pub const MIN_MAC_HEADER_LEN: usize = 24;

pub fn is_data_frame(fc0: u8) -> bool {
    fc0 & 0x0c == 0x08
}

/// QoS data subtypes have bit 7 of the first frame-control byte set.
pub fn is_qos_data(fc0: u8) -> bool {
    fc0 & 0x8c == 0x88
}

pub fn is_protected(fc1: u8) -> bool {
    fc1 & 0x40 != 0
}

pub fn to_ds(fc1: u8) -> bool {
    fc1 & 0x01 != 0
}

pub fn from_ds(fc1: u8) -> bool {
    fc1 & 0x02 != 0
}

fn addr(header: &[u8], offset: usize) -> Option<[u8; 6]> {
    header.get(offset..offset + 6)?.try_into().ok()
}

/// Derive the (station, BSSID) pair from a MAC header.
///
/// Selection by the FromDS/ToDS bit pair:
///
/// | FromDS | ToDS | station | BSSID |
/// |--------|------|---------|-------|
/// |   0    |  0   |  addr2  | addr3 |
/// |   0    |  1   |  addr2  | addr1 |
/// |   1    |  0   |  addr1  | addr2 |
/// |   1    |  1   |  addr2  | addr1 |
///
/// This deliberately favors returning a possibly approximate address over
/// failing, since the result is only used for cache keying. A header too
/// short to carry the mapped addresses yields `None`.
pub fn extract_addresses(header: &[u8]) -> Option<([u8; 6], [u8; 6])> {
    if header.len() < MIN_MAC_HEADER_LEN {
        return None;
    }
    let fc1 = header[1];
    let addr1 = addr(header, 4)?;
    let addr2 = addr(header, 10)?;
    let addr3 = addr(header, 16)?;

    let pair = match (from_ds(fc1), to_ds(fc1)) {
        (false, false) => (addr2, addr3),
        (false, true) => (addr2, addr1),
        (true, false) => (addr1, addr2),
        (true, true) => (addr2, addr1),
    };
    Some(pair)
}
