#![deny(unsafe_code, keyword_idents, non_ascii_idents, missing_abi)]
#![deny(trivial_casts, trivial_numeric_casts, unused_extern_crates)]
#![deny(unused_import_braces, unused_lifetimes, unused_macro_rules)]
#![warn(missing_docs, unused_qualifications, variant_size_differences)]
//
#![doc = include_str!("../README.md")]

// Implements the hardened core of a PKI/CMS middleware stack: the ASN.1
// BER/DER and length-prefixed codecs, and the mechanism layer composing
// primitive contexts into the S/MIME, PKCS #5/#12, TLS 1.0-1.2, OpenPGP and
// CMP operations.  See README.md for the subsystem map.
//
// Functionality map
//
// Stream abstraction (sticky-error memory/null streams)  --> stream.rs
// BER/DER length + tag decoding, primitive readers       --> asn1_read.rs
// Constructed/hole readers, read_raw_object_alloc        --> asn1_read.rs
// Full-encoding validation                               --> asn1_check.rs
// BER/DER writers and sizeof helpers                     --> asn1_write.rs
// 16/32-bit length-prefixed codec (TLS/SSH/PGP)          --> wire.rs
// Hash primitive interface (RFC 2104 HMAC included)      --> hashes.rs
// Bignum import/export policy                            --> bignum.rs
// Object-kernel context traits                           --> kernel.rs
// Mechanism descriptors and dispatch                     --> mech.rs
// PBKDF2/PKCS #12/SSL/TLS/S2K/CMP derivation             --> derive.rs
// PKCS #1 v1.5 signatures (+ SSL dual-hash)              --> sign.rs
// PKCS #1 v1.5 / OAEP / PGP key transport                --> pkwrap.rs
// CMS triple-wrap symmetric key wrap                     --> cwrap.rs
// PKCS #15/#8 and PGP private-key wrap                   --> privkey.rs

pub mod asn1_check;
pub mod asn1_read;
pub mod asn1_write;
pub mod bignum;
pub mod cwrap;
pub mod derive;
pub mod hashes;
pub mod kernel;
pub mod mech;
pub mod pkwrap;
pub mod privkey;
pub mod sign;
pub mod stream;
pub mod wire;

/// Largest public-key modulus handled anywhere in the crate, in bytes
/// (4096 bits).  Fixed-size stack buffers for RSA transforms are sized to
/// this plus a small guard.
pub const MAX_PKCSIZE: usize = 512;

/// Enforced lower bound on a public-key modulus length in bytes (1024
/// bits).  Values between [`MIN_PKCSIZE_THRESHOLD`] and this are reported
/// as not-secure rather than malformed.
pub const MIN_PKCSIZE: usize = 128;

/// Threshold below which a public-key value is treated as garbage rather
/// than merely a too-short key (512 bits).
pub const MIN_PKCSIZE_THRESHOLD: usize = 64;

/// Largest hash output handled (SHA-512).
pub const MAX_HASHSIZE: usize = 64;

/// Smallest hash output accepted by the mechanism layer (MD5).
pub const MIN_HASHSIZE: usize = 16;

/// Largest symmetric key handled, in bytes.
pub const MAX_KEYSIZE: usize = 64;

/// Smallest symmetric key or raw payload accepted by any unwrap operation.
pub const MIN_KEYSIZE: usize = 8;

/// Largest symmetric key any current algorithm actually uses; unwrapped
/// key-length bytes outside `MIN_KEYSIZE..=MAX_WORKING_KEYSIZE` mean the
/// unwrap used the wrong KEK.
pub const MAX_WORKING_KEYSIZE: usize = 32;

/// Largest cipher block / IV size handled (AES).
pub const MAX_IVSIZE: usize = 16;

/// Largest encoded OBJECT IDENTIFIER accepted, including tag and length.
pub const MAX_OID_SIZE: usize = 32;

/// Smallest encoded OBJECT IDENTIFIER accepted: tag, length and the
/// minimum three content bytes.
pub const MIN_OID_SIZE: usize = 5;

/// Upper bound on any decoded length.  Anything larger is treated as an
/// encoding error regardless of how many length octets expressed it.
pub const MAX_INTLENGTH: usize = (1 << 20) - 1;

/// Upper bound on lengths read through the short-form APIs, which cover
/// all PKI data other than CMS enveloped content.
pub const MAX_INTLENGTH_SHORT: usize = 32_767;

/// Status codes for every fallible operation in the crate.
///
/// The mechanism layer goes to some trouble to pick the right variant:
/// adversarial or corrupted input is [`BadData`](CryptError::BadData), a
/// failure whose overwhelmingly likely cause is decryption with the wrong
/// key or passphrase is [`WrongKey`](CryptError::WrongKey), a format
/// failure inside an otherwise-valid signature payload is
/// [`Signature`](CryptError::Signature), and a failed internal consistency
/// check (recovered signature mismatch, plaintext surviving encryption) is
/// [`Failed`](CryptError::Failed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptError {
    /// Input data is malformed or corrupted.
    #[error("bad data")]
    BadData,
    /// A length or value exceeds the permitted range or buffer.
    #[error("overflow")]
    Overflow,
    /// Too little data present for the operation.
    #[error("underflow")]
    Underflow,
    /// The data is well-formed but cryptographically too weak to accept.
    #[error("not secure")]
    NoSecure,
    /// Signature verification failed.
    #[error("bad signature")]
    Signature,
    /// The unwrap key (or the passphrase it was derived from) is wrong.
    #[error("wrong key")]
    WrongKey,
    /// An internal consistency check failed; output has been zeroised.
    #[error("operation failed")]
    Failed,
    /// The requested algorithm or parameter set is not available.
    #[error("not available")]
    NotAvail,
    /// Memory allocation failed.
    #[error("out of memory")]
    Memory,
    /// The key is not permitted to perform the requested operation.
    #[error("permission denied")]
    Permission,
}

/// Crate-wide result alias.
pub type CryptResult<T> = Result<T, CryptError>;

/// If the condition is not met, return the given error.  Borrowed from the
/// `anyhow` crate.
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err);
        }
    };
}

pub(crate) use ensure; // make available throughout crate
