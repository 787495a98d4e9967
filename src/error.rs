//! Error types for the decryption engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = core::result::Result<T, DecryptError>;

/// Per-frame and configuration errors.
///
/// `process_frame` never partially mutates the caller's buffer: whenever one
/// of these is returned, the frame bytes are exactly as they were passed in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// The frame carries nothing this engine handles (not a data frame,
    /// cleartext without an 802.1X payload, or decryption was not requested).
    #[error("frame carries no encrypted or authentication data")]
    NoData,

    /// The frame is empty, truncated, or its lengths are inconsistent.
    #[error("frame length is inconsistent or below the minimum")]
    WrongSize,

    /// The station/BSSID pair could not be resolved from the MAC header.
    #[error("addresses could not be resolved; more frames are required")]
    MoreDataNeeded,

    /// EAPOL-Key flags do not match any 4-way handshake message shape.
    #[error("not a valid EAPOL-Key handshake message")]
    InvalidHandshake,

    /// The EAPOL-Key descriptor version is neither 1 (HMAC-MD5) nor 2 (HMAC-SHA1).
    #[error("unsupported key descriptor version {0}")]
    UnsupportedDescriptorVersion(u8),

    /// Every candidate key was tried and none verified or decrypted the frame.
    #[error("no configured key matched")]
    NoKeyMatched,

    /// A cipher primitive reported an integrity failure (bad ICV or CCM tag).
    #[error("payload integrity check failed")]
    IntegrityFailure,

    /// The security association table is at capacity; the new pair was not inserted.
    #[error("security association table is full ({0} entries)")]
    SaTableFull(usize),

    /// `set_keys` was called with more candidates than the store can hold.
    /// The previously configured keys are left untouched.
    #[error("too many keys: {given} candidates, {max} allowed")]
    TooManyKeys { given: usize, max: usize },

    /// A key specification string could not be parsed.
    #[error("invalid key specification: {0}")]
    InvalidKey(String),
}
