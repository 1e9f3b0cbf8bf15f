use std::fmt;

/// The single error type for every fallible operation in this crate.
///
/// Every invariant violation named in the data model aborts the current
/// operation with one of these variants; the tree, group context and key
/// schedule are never left half-updated (see the crate-level "staged writes"
/// note on `RatchetTree`).
#[derive(Debug)]
pub enum Error {
    /// Structural or semantic validation failure at pack/unpack time, or a
    /// handshake precondition that does not hold (e.g. `Add.index > num_leaves`,
    /// a non-blank leaf at `Add.index`, a wrong-length `Update` direct path).
    MalformedMessage(String),
    /// A derived public key disagrees with the public key carried in an
    /// `Update`'s direct path.
    CryptoKeyMismatch,
    /// `process_update` could not find a resolution node whose private key
    /// is known locally.
    NoPrivateKeyAvailable,
    /// The keystore has no init key on file for the requested user.
    UnknownInitKey,
    /// An AEAD/ECIES seal or open operation failed.
    EncryptionError(&'static str),
    /// A cipher suite primitive was misconfigured (wrong key/IV length, etc).
    ConfigError(&'static str),
    /// Tree-index arithmetic was asked to operate on an index outside the
    /// current tree, or an operation precondition on tree shape failed.
    TreeError(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedMessage(msg) => write!(f, "malformed message: {}", msg),
            Error::CryptoKeyMismatch => write!(f, "derived public key does not match transmitted key"),
            Error::NoPrivateKeyAvailable => write!(f, "no known private key in resolution"),
            Error::UnknownInitKey => write!(f, "keystore has no init key for user"),
            Error::EncryptionError(msg) => write!(f, "encryption error: {}", msg),
            Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
            Error::TreeError(msg) => write!(f, "tree error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
