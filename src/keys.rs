/*!
 * Candidate key configuration
 *
 * Holds the ordered list of keys the engine will try against captured
 * traffic: raw WEP keys, WPA passphrases, and pre-computed 256-bit master
 * keys. Keys are validated and normalized once, at configuration time;
 * invalid candidates are dropped and never stored.
 *
 * Keys can also be expressed as `"type:data[:ssid]"` strings, the form a
 * host tool typically keeps in its preferences:
 * - `wep:0102030405` (hex, 5-32 bytes; `wep40:`/`wep104:` force 5/13)
 * - `wpa-pwd:MyPassphrase:MySSID` (SSID optional, `%xx`-escaped)
 * - `wpa-psk:<64 hex chars>` (raw 256-bit PMK)
 */

use serde::{Deserialize, Serialize};

use crate::crypto::derive_pmk;
use crate::error::{DecryptError, Result};

/// Maximum number of configured candidate keys.
pub const MAX_KEYS: usize = 64;

/// Minimum/maximum raw WEP key length in bytes.
pub const WEP_KEY_MIN_LEN: usize = 5;
pub const WEP_KEY_MAX_LEN: usize = 32;

/// WPA passphrase length bounds (IEEE 802.11i Annex H).
pub const WPA_PASSPHRASE_MIN_LEN: usize = 8;
pub const WPA_PASSPHRASE_MAX_LEN: usize = 63;

/// Maximum SSID length in bytes.
pub const MAX_SSID_LEN: usize = 32;

/// A candidate decryption key, tagged by variant.
///
/// `Wep40`/`Wep104` exist as configuration forms only: validation rewrites
/// them to a generic `Wep` key of exactly 5/13 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    /// Raw WEP key, 5-32 bytes.
    Wep(Vec<u8>),
    /// WEP-40 key, normalized to `Wep` with length 5.
    Wep40(Vec<u8>),
    /// WEP-104 key, normalized to `Wep` with length 13.
    Wep104(Vec<u8>),
    /// WPA/WPA2 passphrase with an optional SSID.
    ///
    /// An empty SSID means "wildcard": during handshake verification the
    /// engine substitutes the most recently observed broadcast SSID.
    WpaPassphrase { passphrase: String, ssid: Vec<u8> },
    /// Raw 256-bit pairwise master key (PSK/PMK).
    WpaPsk([u8; 32]),
}

impl Key {
    /// True for the WPA family (usable for 4-way handshake verification).
    pub fn is_wpa(&self) -> bool {
        matches!(self, Key::WpaPassphrase { .. } | Key::WpaPsk(_))
    }

    /// True for WEP keys (after normalization only `Key::Wep` remains).
    pub fn is_wep(&self) -> bool {
        matches!(self, Key::Wep(_) | Key::Wep40(_) | Key::Wep104(_))
    }

    /// Validate this candidate, returning its normalized form.
    ///
    /// WEP keys must be 5-32 bytes; WEP-40/WEP-104 are truncated to their
    /// fixed lengths and rewritten as generic WEP. Passphrases must be 8-63
    /// ASCII characters with an SSID of at most 32 bytes. Raw master keys
    /// are accepted unconditionally.
    pub fn validate(&self) -> Result<Key> {
        match self {
            Key::Wep(bytes) => {
                if bytes.len() < WEP_KEY_MIN_LEN || bytes.len() > WEP_KEY_MAX_LEN {
                    return Err(DecryptError::InvalidKey(format!(
                        "WEP key must be {WEP_KEY_MIN_LEN}-{WEP_KEY_MAX_LEN} bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(Key::Wep(bytes.clone()))
            }
            Key::Wep40(bytes) => {
                if bytes.len() < 5 {
                    return Err(DecryptError::InvalidKey(
                        "WEP-40 key must be at least 5 bytes".into(),
                    ));
                }
                Ok(Key::Wep(bytes[..5].to_vec()))
            }
            Key::Wep104(bytes) => {
                if bytes.len() < 13 {
                    return Err(DecryptError::InvalidKey(
                        "WEP-104 key must be at least 13 bytes".into(),
                    ));
                }
                Ok(Key::Wep(bytes[..13].to_vec()))
            }
            Key::WpaPassphrase { passphrase, ssid } => {
                let len = passphrase.len();
                if len < WPA_PASSPHRASE_MIN_LEN || len > WPA_PASSPHRASE_MAX_LEN {
                    return Err(DecryptError::InvalidKey(format!(
                        "WPA passphrase must be {WPA_PASSPHRASE_MIN_LEN}-{WPA_PASSPHRASE_MAX_LEN} characters, got {len}"
                    )));
                }
                if !passphrase.is_ascii() {
                    return Err(DecryptError::InvalidKey(
                        "WPA passphrase must be ASCII".into(),
                    ));
                }
                if ssid.len() > MAX_SSID_LEN {
                    return Err(DecryptError::InvalidKey(format!(
                        "SSID must be at most {MAX_SSID_LEN} bytes, got {}",
                        ssid.len()
                    )));
                }
                Ok(self.clone())
            }
            Key::WpaPsk(_) => Ok(self.clone()),
        }
    }

    /// Parse a `"type:data[:ssid]"` key specification string.
    pub fn parse_spec(spec: &str) -> Result<Key> {
        let (tag, rest) = spec
            .split_once(':')
            .ok_or_else(|| DecryptError::InvalidKey(format!("missing ':' in \"{spec}\"")))?;

        let key = match tag {
            "wep" => Key::Wep(decode_hex(rest)?),
            "wep40" => Key::Wep40(decode_hex(rest)?),
            "wep104" => Key::Wep104(decode_hex(rest)?),
            "wpa-pwd" => {
                // A ':' in the passphrase itself must be %3A-escaped.
                let mut parts = rest.splitn(2, ':');
                let passphrase = String::from_utf8(percent_decode(
                    parts.next().unwrap_or_default(),
                )?)
                .map_err(|_| DecryptError::InvalidKey("passphrase is not UTF-8".into()))?;
                // SSIDs are arbitrary bytes, not text
                let ssid = match parts.next() {
                    Some(s) => percent_decode(s)?,
                    None => Vec::new(),
                };
                Key::WpaPassphrase {
                    passphrase,
                    ssid,
                }
            }
            "wpa-psk" | "wpa-pmk" => {
                let bytes = decode_hex(rest)?;
                let pmk: [u8; 32] = bytes.try_into().map_err(|_| {
                    DecryptError::InvalidKey("wpa-psk must be 64 hex characters".into())
                })?;
                Key::WpaPsk(pmk)
            }
            other => {
                return Err(DecryptError::InvalidKey(format!("unknown key type \"{other}\"")))
            }
        };
        key.validate()
    }

    /// Serialize back to the textual `"type:data[:ssid]"` form.
    pub fn to_spec_string(&self) -> String {
        match self {
            Key::Wep(b) | Key::Wep40(b) | Key::Wep104(b) => format!("wep:{}", hex::encode(b)),
            Key::WpaPassphrase { passphrase, ssid } => {
                if ssid.is_empty() {
                    format!("wpa-pwd:{}", percent_encode(passphrase.as_bytes()))
                } else {
                    format!(
                        "wpa-pwd:{}:{}",
                        percent_encode(passphrase.as_bytes()),
                        percent_encode(ssid)
                    )
                }
            }
            Key::WpaPsk(pmk) => format!("wpa-psk:{}", hex::encode(pmk)),
        }
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| DecryptError::InvalidKey(format!("bad hex string: {e}")))
}

fn percent_decode(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 3 > bytes.len() {
                return Err(DecryptError::InvalidKey("truncated %-escape".into()));
            }
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            match (hi, lo) {
                (Some(h), Some(l)) => out.push(((h << 4) | l) as u8),
                _ => return Err(DecryptError::InvalidKey("bad %-escape".into())),
            }
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() && b != b'%' && b != b':' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
    }
    out
}

/// A validated key plus its pre-computed master key, when one exists.
///
/// For passphrase keys configured with a concrete SSID the PMK is derived
/// eagerly at `set_keys` time, so the 4096-iteration PBKDF2 runs once per
/// key instead of once per handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredKey {
    pub key: Key,
    pub pmk: Option<[u8; 32]>,
}

/// Ordered, capacity-bounded store of validated candidate keys.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: Vec<ConfiguredKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Replace the entire configured key set.
    ///
    /// Fails without mutation if `candidates` exceeds [`MAX_KEYS`].
    /// Otherwise clears the prior keys, keeps only the candidates that
    /// validate (in their original relative order), and returns how many
    /// were accepted.
    pub fn set_keys(&mut self, candidates: &[Key]) -> Result<usize> {
        if candidates.len() > MAX_KEYS {
            return Err(DecryptError::TooManyKeys {
                given: candidates.len(),
                max: MAX_KEYS,
            });
        }

        self.keys.clear();
        for candidate in candidates {
            let key = match candidate.validate() {
                Ok(k) => k,
                Err(e) => {
                    tracing::warn!("dropping invalid candidate key: {e}");
                    continue;
                }
            };
            let pmk = match &key {
                Key::WpaPassphrase { passphrase, ssid } if !ssid.is_empty() => {
                    Some(derive_pmk(passphrase, ssid))
                }
                _ => None,
            };
            self.keys.push(ConfiguredKey { key, pmk });
        }
        Ok(self.keys.len())
    }

    /// The configured keys, in order.
    pub fn keys(&self) -> &[ConfiguredKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wep_length_bounds() {
        assert!(Key::Wep(vec![1, 2, 3, 4]).validate().is_err());
        assert!(Key::Wep(vec![0; 33]).validate().is_err());
        assert!(Key::Wep(vec![0; 5]).validate().is_ok());
        assert!(Key::Wep(vec![0; 32]).validate().is_ok());
    }

    #[test]
    fn test_wep40_wep104_normalization() {
        let k = Key::Wep40(vec![1, 2, 3, 4, 5, 6, 7]).validate().unwrap();
        assert_eq!(k, Key::Wep(vec![1, 2, 3, 4, 5]));

        let k = Key::Wep104(vec![9; 16]).validate().unwrap();
        assert_eq!(k, Key::Wep(vec![9; 13]));

        assert!(Key::Wep40(vec![1, 2]).validate().is_err());
        assert!(Key::Wep104(vec![1; 12]).validate().is_err());
    }

    #[test]
    fn test_passphrase_bounds() {
        let ok = Key::WpaPassphrase {
            passphrase: "password".into(),
            ssid: b"IEEE".to_vec(),
        };
        assert!(ok.validate().is_ok());

        let short = Key::WpaPassphrase {
            passphrase: "seven77".into(),
            ssid: Vec::new(),
        };
        assert!(short.validate().is_err());

        let long = Key::WpaPassphrase {
            passphrase: "x".repeat(64),
            ssid: Vec::new(),
        };
        assert!(long.validate().is_err());

        let bad_ssid = Key::WpaPassphrase {
            passphrase: "password".into(),
            ssid: vec![0; 33],
        };
        assert!(bad_ssid.validate().is_err());
    }

    #[test]
    fn test_spec_string_parse() {
        assert_eq!(
            Key::parse_spec("wep:0102030405").unwrap(),
            Key::Wep(vec![1, 2, 3, 4, 5])
        );
        assert_eq!(
            Key::parse_spec("wpa-pwd:MyPassword:MySSID").unwrap(),
            Key::WpaPassphrase {
                passphrase: "MyPassword".into(),
                ssid: b"MySSID".to_vec()
            }
        );
        assert_eq!(
            Key::parse_spec("wpa-pwd:pass%3aword").unwrap(),
            Key::WpaPassphrase {
                passphrase: "pass:word".into(),
                ssid: Vec::new()
            }
        );
        let psk = Key::parse_spec(&format!("wpa-psk:{}", "ab".repeat(32))).unwrap();
        assert_eq!(psk, Key::WpaPsk([0xab; 32]));

        assert!(Key::parse_spec("wpa-psk:abcd").is_err());
        assert!(Key::parse_spec("foo:bar").is_err());
        assert!(Key::parse_spec("nocolon").is_err());
    }

    #[test]
    fn test_spec_string_round_trip() {
        for spec in [
            "wep:0102030405",
            "wpa-pwd:MyPassword:MySSID",
            "wpa-pwd:justapass",
            &format!("wpa-psk:{}", "0f".repeat(32)),
        ] {
            let key = Key::parse_spec(spec).unwrap();
            assert_eq!(key.to_spec_string(), *spec);
        }
    }

    #[test]
    fn test_spec_string_carries_non_utf8_ssid() {
        // SSIDs are raw bytes; the %-escaping must round-trip any of them
        let key = Key::WpaPassphrase {
            passphrase: "password".into(),
            ssid: vec![0xff, 0xfe, b'n', b'e', b't', 0x00],
        };
        let spec = key.to_spec_string();
        assert_eq!(spec, "wpa-pwd:password:%ff%fenet%00");
        assert_eq!(Key::parse_spec(&spec).unwrap(), key);

        // the passphrase segment stays text
        assert!(Key::parse_spec("wpa-pwd:pass%ffword:net").is_err());
    }

    #[test]
    fn test_key_survives_serde() {
        // host tools persist configured keys as JSON preferences
        let key = Key::WpaPassphrase {
            passphrase: "password".into(),
            ssid: b"IEEE".to_vec(),
        };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(serde_json::from_str::<Key>(&json).unwrap(), key);
    }

    #[test]
    fn test_set_keys_validates_and_preserves_order() {
        let mut store = KeyStore::new();
        let accepted = store
            .set_keys(&[
                Key::Wep(vec![1, 2, 3]), // invalid, dropped
                Key::Wep40(vec![1, 2, 3, 4, 5]),
                Key::WpaPassphrase {
                    passphrase: "password".into(),
                    ssid: b"IEEE".to_vec(),
                },
                Key::Wep104(vec![7; 13]),
            ])
            .unwrap();
        assert_eq!(accepted, 3);
        assert_eq!(store.keys()[0].key, Key::Wep(vec![1, 2, 3, 4, 5]));
        assert!(matches!(store.keys()[1].key, Key::WpaPassphrase { .. }));
        assert_eq!(store.keys()[2].key, Key::Wep(vec![7; 13]));
    }

    #[test]
    fn test_set_keys_precomputes_pmk() {
        let mut store = KeyStore::new();
        store
            .set_keys(&[
                Key::WpaPassphrase {
                    passphrase: "password".into(),
                    ssid: b"IEEE".to_vec(),
                },
                Key::WpaPassphrase {
                    passphrase: "password".into(),
                    ssid: Vec::new(), // wildcard: no eager derivation possible
                },
            ])
            .unwrap();
        assert!(store.keys()[0].pmk.is_some());
        assert!(store.keys()[1].pmk.is_none());
    }

    #[test]
    fn test_set_keys_over_capacity_mutates_nothing() {
        let mut store = KeyStore::new();
        store.set_keys(&[Key::Wep(vec![1, 2, 3, 4, 5])]).unwrap();

        let too_many: Vec<Key> = (0..MAX_KEYS + 1).map(|_| Key::Wep(vec![0; 5])).collect();
        let err = store.set_keys(&too_many).unwrap_err();
        assert!(matches!(err, DecryptError::TooManyKeys { .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys()[0].key, Key::Wep(vec![1, 2, 3, 4, 5]));
    }
}
