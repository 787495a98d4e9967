/*!
 * Security association cache
 *
 * One association per (BSSID, station) pair, created lazily on the first
 * frame seen for the pair and kept until the context is cleared. Each entry
 * caches the handshake progress, captured nonce, derived session key and
 * the confirmed candidate key, so repeated traffic on the same link never
 * re-runs key derivation.
 *
 * The table is capacity-bounded: once full, new pairs are rejected with a
 * distinct error rather than evicting live associations.
 */

use std::collections::HashMap;

use crate::crypto::Ptk;
use crate::error::{DecryptError, Result};
use crate::keys::ConfiguredKey;

/// Maximum number of live security associations.
pub const MAX_ASSOCIATIONS: usize = 256;

/// Identifies one link: the access point and the station talking to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SaId {
    pub bssid: [u8; 6],
    pub sta: [u8; 6],
}

/// Pairwise handshake progress for one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No handshake message seen yet.
    #[default]
    Unseen,
    /// Message 1 processed: peer nonce and descriptor version captured.
    NonceCaptured,
    /// Message 2 verified: session key derived and cached.
    PtkDerived,
    /// Message 4 observed: handshake complete.
    Complete,
}

/// Cached state for one (BSSID, station) link.
#[derive(Debug, Clone, Default)]
pub struct SecurityAssociation {
    pub state: HandshakeState,
    /// ANonce captured from handshake message 1.
    pub anonce: [u8; 32],
    /// EAPOL-Key descriptor version (1 = TKIP/MD5, 2 = CCMP/SHA1).
    pub descriptor_version: u8,
    /// Derived session key, present from state `PtkDerived` on.
    pub ptk: Option<Ptk>,
    /// The candidate key that verified or decrypted traffic on this link.
    pub key: Option<ConfiguredKey>,
}

impl SecurityAssociation {
    /// Whether this association has key material usable for data frames.
    pub fn can_decrypt(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::PtkDerived | HandshakeState::Complete
        ) && self.ptk.is_some()
    }
}

/// Bounded map of live associations.
#[derive(Debug, Default)]
pub struct SaTable {
    map: HashMap<SaId, SecurityAssociation>,
}

impl SaTable {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, id: &SaId) -> Option<&SecurityAssociation> {
        self.map.get(id)
    }

    pub fn get_mut(&mut self, id: &SaId) -> Option<&mut SecurityAssociation> {
        self.map.get_mut(id)
    }

    /// Look up the association for `id`, creating a fresh one if the pair
    /// has not been seen. Fails when the table is full and `id` is new;
    /// existing entries are never disturbed.
    pub fn get_or_insert(&mut self, id: SaId) -> Result<&mut SecurityAssociation> {
        if !self.map.contains_key(&id) {
            if self.map.len() >= MAX_ASSOCIATIONS {
                return Err(DecryptError::SaTableFull(MAX_ASSOCIATIONS));
            }
            tracing::debug!(bssid = ?id.bssid, sta = ?id.sta, "new security association");
        }
        Ok(self.map.entry(id).or_default())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> SaId {
        SaId {
            bssid: [n; 6],
            sta: [0xee; 6],
        }
    }

    #[test]
    fn test_find_after_insert() {
        let mut table = SaTable::new();
        assert!(table.get(&id(1)).is_none());

        let sa = table.get_or_insert(id(1)).unwrap();
        sa.state = HandshakeState::NonceCaptured;

        let found = table.get(&id(1)).unwrap();
        assert_eq!(found.state, HandshakeState::NonceCaptured);
        assert!(table.get(&id(2)).is_none());
    }

    #[test]
    fn test_get_or_insert_is_idempotent() {
        let mut table = SaTable::new();
        table.get_or_insert(id(1)).unwrap().descriptor_version = 2;
        table.get_or_insert(id(1)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&id(1)).unwrap().descriptor_version, 2);
    }

    #[test]
    fn test_capacity_exhaustion_fails_cleanly() {
        let mut table = SaTable::new();
        for i in 0..MAX_ASSOCIATIONS {
            let sa_id = SaId {
                bssid: (i as u64).to_be_bytes()[2..8].try_into().unwrap(),
                sta: [0; 6],
            };
            table.get_or_insert(sa_id).unwrap();
        }
        assert_eq!(table.len(), MAX_ASSOCIATIONS);

        let err = table.get_or_insert(id(0xfe)).unwrap_err();
        assert_eq!(err, DecryptError::SaTableFull(MAX_ASSOCIATIONS));
        assert_eq!(table.len(), MAX_ASSOCIATIONS);

        // existing ids still resolve after the failed insert
        let existing = SaId {
            bssid: 0u64.to_be_bytes()[2..8].try_into().unwrap(),
            sta: [0; 6],
        };
        assert!(table.get(&existing).is_some());
    }
}
