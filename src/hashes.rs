//! Hash primitive interface.
//!
//! The compression functions themselves are external (the RustCrypto
//! digest crates); this module is the dispatch layer the mechanism code
//! works through: a runtime [`HashAlgo`] selector, a cloneable streaming
//! [`HashState`], one-shot helpers, and the HMAC equivalent.  Cloning a
//! keyed [`HmacState`] is cheap and is how the PRFs reuse the keyed inner
//! state across blocks instead of rekeying every iteration.
//!
//! MD5 and SHA-1 exist here solely for the legacy SSL/TLS PRFs, the PGP
//! integrity checks and PKCS #1 interop; nothing new should use them.

use crate::{CryptError, CryptResult, MAX_HASHSIZE};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

/// Hash algorithm selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgo {
    /// MD5 (legacy interop only).
    Md5,
    /// SHA-1 (legacy interop only).
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgo {
    /// Digest size in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            HashAlgo::Md5 => 16,
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha384 => 48,
            HashAlgo::Sha512 => 64,
        }
    }

    /// Input block size in bytes, which is also the HMAC pad size.
    #[must_use]
    pub fn block_size(self) -> usize {
        match self {
            HashAlgo::Md5 | HashAlgo::Sha1 | HashAlgo::Sha256 => 64,
            HashAlgo::Sha384 | HashAlgo::Sha512 => 128,
        }
    }
}

/// Streaming hash state, cloneable mid-stream for snapshot reuse.
#[derive(Clone)]
pub enum HashState {
    /// MD5 state.
    Md5(Md5),
    /// SHA-1 state.
    Sha1(Sha1),
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
}

impl HashState {
    /// Start a hash of the given algorithm.
    #[must_use]
    pub fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Md5 => HashState::Md5(Md5::new()),
            HashAlgo::Sha1 => HashState::Sha1(Sha1::new()),
            HashAlgo::Sha256 => HashState::Sha256(Sha256::new()),
            HashAlgo::Sha384 => HashState::Sha384(Sha384::new()),
            HashAlgo::Sha512 => HashState::Sha512(Sha512::new()),
        }
    }

    /// The algorithm this state belongs to.
    #[must_use]
    pub fn algo(&self) -> HashAlgo {
        match self {
            HashState::Md5(_) => HashAlgo::Md5,
            HashState::Sha1(_) => HashAlgo::Sha1,
            HashState::Sha256(_) => HashAlgo::Sha256,
            HashState::Sha384(_) => HashAlgo::Sha384,
            HashState::Sha512(_) => HashAlgo::Sha512,
        }
    }

    /// Absorb data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashState::Md5(state) => state.update(data),
            HashState::Sha1(state) => state.update(data),
            HashState::Sha256(state) => state.update(data),
            HashState::Sha384(state) => state.update(data),
            HashState::Sha512(state) => state.update(data),
        }
    }

    /// Complete the hash into the front of `out`, returning the digest
    /// size.
    pub fn finalize_into(self, out: &mut [u8]) -> usize {
        let size = self.algo().size();
        debug_assert!(out.len() >= size);
        match self {
            HashState::Md5(state) => out[..size].copy_from_slice(&state.finalize()),
            HashState::Sha1(state) => out[..size].copy_from_slice(&state.finalize()),
            HashState::Sha256(state) => out[..size].copy_from_slice(&state.finalize()),
            HashState::Sha384(state) => out[..size].copy_from_slice(&state.finalize()),
            HashState::Sha512(state) => out[..size].copy_from_slice(&state.finalize()),
        }
        size
    }
}

/// One-shot hash of a list of input parts, written to the front of `out`.
/// Returns the digest size.
pub fn hash_atomic(algo: HashAlgo, out: &mut [u8], data: &[&[u8]]) -> usize {
    let mut state = HashState::new(algo);
    for part in data {
        state.update(part);
    }
    state.finalize_into(out)
}

/// One-shot hash returning a fixed buffer with the digest at the front.
#[must_use]
pub fn hash_atomic_buf(algo: HashAlgo, data: &[&[u8]]) -> [u8; MAX_HASHSIZE] {
    let mut out = [0u8; MAX_HASHSIZE];
    let _size = hash_atomic(algo, &mut out, data);
    out
}

/// Keyed HMAC state.  Key setup (the padded-key inner/outer hashing) is
/// done once at construction; cloning the state gives a fresh MAC with
/// the same key without repeating the setup, which is the dominant cost
/// saving in the block-iterated PRFs.
#[derive(Clone)]
pub enum HmacState {
    /// HMAC-MD5 state.
    Md5(Hmac<Md5>),
    /// HMAC-SHA1 state.
    Sha1(Hmac<Sha1>),
    /// HMAC-SHA256 state.
    Sha256(Hmac<Sha256>),
    /// HMAC-SHA384 state.
    Sha384(Hmac<Sha384>),
    /// HMAC-SHA512 state.
    Sha512(Hmac<Sha512>),
}

impl HmacState {
    /// Key an HMAC of the given algorithm.  Over-long keys are hashed
    /// down per RFC 2104.
    pub fn new(algo: HashAlgo, key: &[u8]) -> CryptResult<Self> {
        Ok(match algo {
            HashAlgo::Md5 => HmacState::Md5(
                Hmac::new_from_slice(key).map_err(|_| CryptError::Failed)?,
            ),
            HashAlgo::Sha1 => HmacState::Sha1(
                Hmac::new_from_slice(key).map_err(|_| CryptError::Failed)?,
            ),
            HashAlgo::Sha256 => HmacState::Sha256(
                Hmac::new_from_slice(key).map_err(|_| CryptError::Failed)?,
            ),
            HashAlgo::Sha384 => HmacState::Sha384(
                Hmac::new_from_slice(key).map_err(|_| CryptError::Failed)?,
            ),
            HashAlgo::Sha512 => HmacState::Sha512(
                Hmac::new_from_slice(key).map_err(|_| CryptError::Failed)?,
            ),
        })
    }

    /// The underlying hash algorithm.
    #[must_use]
    pub fn algo(&self) -> HashAlgo {
        match self {
            HmacState::Md5(_) => HashAlgo::Md5,
            HmacState::Sha1(_) => HashAlgo::Sha1,
            HmacState::Sha256(_) => HashAlgo::Sha256,
            HmacState::Sha384(_) => HashAlgo::Sha384,
            HmacState::Sha512(_) => HashAlgo::Sha512,
        }
    }

    /// Absorb data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            HmacState::Md5(state) => state.update(data),
            HmacState::Sha1(state) => state.update(data),
            HmacState::Sha256(state) => state.update(data),
            HmacState::Sha384(state) => state.update(data),
            HmacState::Sha512(state) => state.update(data),
        }
    }

    /// Complete the MAC into the front of `out`, returning the MAC size.
    pub fn finalize_into(self, out: &mut [u8]) -> usize {
        let size = self.algo().size();
        debug_assert!(out.len() >= size);
        match self {
            HmacState::Md5(state) => {
                out[..size].copy_from_slice(&state.finalize().into_bytes());
            }
            HmacState::Sha1(state) => {
                out[..size].copy_from_slice(&state.finalize().into_bytes());
            }
            HmacState::Sha256(state) => {
                out[..size].copy_from_slice(&state.finalize().into_bytes());
            }
            HmacState::Sha384(state) => {
                out[..size].copy_from_slice(&state.finalize().into_bytes());
            }
            HmacState::Sha512(state) => {
                out[..size].copy_from_slice(&state.finalize().into_bytes());
            }
        }
        size
    }
}
