/*!
 * 802.11 link-layer decryption engine
 *
 * Decrypts captured WEP, WPA and WPA2 (personal mode) data frames in
 * place. Feed every captured 802.11 frame to
 * [`Dot11DecryptContext::process_frame`]: cleartext EAPOL-Key frames
 * advance per-link 4-way handshake tracking, and protected data frames
 * are decrypted once a configured key has been confirmed for the link.
 *
 * ```no_run
 * use dot11_decrypt::{Dot11DecryptContext, Key, ProcessOptions};
 *
 * let mut ctx = Dot11DecryptContext::new();
 * ctx.set_keys(&[Key::parse_spec("wpa-pwd:password:HomeNet").unwrap()]).unwrap();
 *
 * let mut frame: Vec<u8> = vec![/* captured 802.11 frame */];
 * match ctx.process_frame(&mut frame, 24, &ProcessOptions::default()) {
 *     Ok(outcome) => println!("{outcome:?}"),
 *     Err(err) => eprintln!("not decrypted: {err}"),
 * }
 * ```
 */

pub mod cipher;
pub mod context;
pub mod crypto;
pub mod eapol;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod keys;
pub mod rc4;
pub mod sa;

pub use context::{Dot11DecryptContext, FrameOutcome, ProcessOptions};
pub use error::{DecryptError, Result};
pub use keys::{ConfiguredKey, Key, KeyStore};
pub use sa::{HandshakeState, SaId, SecurityAssociation};
