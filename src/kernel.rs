//! Context traits standing in for the object kernel.
//!
//! The surrounding system owns cipher, hash and key objects behind
//! reference-counted handles; the mechanism layer only ever talks to them
//! through a handful of messages.  Those messages are modelled here as
//! narrow traits so that the mechanisms stay independent of any concrete
//! cipher or bignum backend: a hardware token, a software context and a
//! test mock all look the same.  Calls may block (a token driver is slow);
//! the mechanisms treat them as synchronous.

use crate::hashes::HashAlgo;
use crate::stream::WriteStream;
use crate::{CryptError, CryptResult, MAX_HASHSIZE};
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;

/// A public-key context performing raw modular transforms.  Data buffers
/// are transformed in place and are always exactly
/// [`key_size`](PkcContext::key_size) bytes.
pub trait PkcContext {
    /// Modulus length in bytes.
    fn key_size(&self) -> usize;

    /// Raw public-key transform (encrypt).
    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()>;

    /// Raw private-key transform (decrypt).
    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()>;

    /// Raw private-key transform (sign).
    fn sign(&mut self, data: &mut [u8]) -> CryptResult<()>;

    /// Raw public-key transform (recover a signature).
    fn sigcheck(&mut self, data: &mut [u8]) -> CryptResult<()>;

    /// Whether the caller has asked for side-channel protection, which
    /// adds a verify-after-sign pass against RSA-CRT fault attacks.
    fn side_channel_protection(&self) -> bool {
        true
    }
}

/// A block-cipher context with an updatable IV (CBC or CFB mode).
pub trait CipherContext {
    /// Cipher block size (equals the IV size).
    fn block_size(&self) -> usize;

    /// Copy the current IV into `iv`, returning its length.
    fn get_iv(&self, iv: &mut [u8]) -> CryptResult<usize>;

    /// Load a new IV.
    fn set_iv(&mut self, iv: &[u8]) -> CryptResult<()>;

    /// Encrypt in place, updating the chaining state.
    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()>;

    /// Decrypt in place, updating the chaining state.
    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()>;
}

/// A completed hash context: hashing is finished and the value can be
/// read out or compared.
pub trait HashContext {
    /// The hash algorithm.
    fn algo(&self) -> HashAlgo;

    /// Copy the completed hash value into `out`, returning its length.
    fn hash_value(&self, out: &mut [u8]) -> CryptResult<usize>;

    /// Constant-time comparison of `value` against the completed hash.
    fn compare_hash(&self, value: &[u8]) -> bool {
        let mut buffer = [0u8; MAX_HASHSIZE];
        let Ok(length) = self.hash_value(&mut buffer) else {
            return false;
        };
        value.len() == length && bool::from(buffer[..length].ct_eq(value))
    }
}

/// A symmetric-key context that keying material can be extracted from or
/// loaded into.
pub trait KeyContext {
    /// Key length in bytes.
    fn key_size(&self) -> usize;

    /// Copy the keying material into `out`, returning its length.
    fn extract_key(&self, out: &mut [u8]) -> CryptResult<usize>;

    /// Load recovered keying material.
    fn load_key(&mut self, key: &[u8]) -> CryptResult<()>;

    /// The OpenPGP algorithm identifier for this context's cipher, for
    /// mechanisms that encode it alongside the wrapped key.
    fn pgp_algo(&self) -> CryptResult<PgpCipherAlgo> {
        Err(CryptError::NotAvail)
    }
}

/// A private-key context whose key data can be serialised for wrapping
/// and reloaded on unwrap.
pub trait PrivateKeyContext {
    /// Write the algorithm's private-key representation in the given
    /// format.  Writing to a null stream predicts the length.
    fn write_private_key(
        &self, stream: &mut WriteStream<'_>, format: PrivateKeyFormat,
    ) -> CryptResult<()>;

    /// Load a private key from its decrypted serialised form.
    fn read_private_key(&mut self, data: &[u8], format: PrivateKeyFormat)
        -> CryptResult<()>;
}

/// Serialisation formats for wrapped private keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivateKeyFormat {
    /// PKCS #15 layout.
    Pkcs15,
    /// The older PKCS #8 layout.
    Pkcs8,
    /// OpenPGP MPI sequence.
    Pgp,
}

/// OpenPGP symmetric-algorithm identifiers (RFC 4880 section 9.2) for the
/// subset of algorithms a wrapped session key may select.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PgpCipherAlgo {
    /// IDEA.
    Idea,
    /// Three-key triple DES.
    TripleDes,
    /// CAST5-128.
    Cast5,
    /// Blowfish-128.
    Blowfish,
    /// AES with a 128-bit key.
    Aes128,
    /// AES with a 192-bit key.
    Aes192,
    /// AES with a 256-bit key.
    Aes256,
    /// Twofish-256.
    Twofish,
}

impl PgpCipherAlgo {
    /// Decode a wire identifier.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(PgpCipherAlgo::Idea),
            2 => Some(PgpCipherAlgo::TripleDes),
            3 => Some(PgpCipherAlgo::Cast5),
            4 => Some(PgpCipherAlgo::Blowfish),
            7 => Some(PgpCipherAlgo::Aes128),
            8 => Some(PgpCipherAlgo::Aes192),
            9 => Some(PgpCipherAlgo::Aes256),
            10 => Some(PgpCipherAlgo::Twofish),
            _ => None,
        }
    }

    /// The wire identifier.
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            PgpCipherAlgo::Idea => 1,
            PgpCipherAlgo::TripleDes => 2,
            PgpCipherAlgo::Cast5 => 3,
            PgpCipherAlgo::Blowfish => 4,
            PgpCipherAlgo::Aes128 => 7,
            PgpCipherAlgo::Aes192 => 8,
            PgpCipherAlgo::Aes256 => 9,
            PgpCipherAlgo::Twofish => 10,
        }
    }

    /// The algorithm's key length in bytes.
    #[must_use]
    pub fn key_size(self) -> usize {
        match self {
            PgpCipherAlgo::Idea
            | PgpCipherAlgo::Cast5
            | PgpCipherAlgo::Blowfish
            | PgpCipherAlgo::Aes128 => 16,
            PgpCipherAlgo::TripleDes | PgpCipherAlgo::Aes192 => 24,
            PgpCipherAlgo::Aes256 | PgpCipherAlgo::Twofish => 32,
        }
    }
}

/// Factory creating session-key contexts during PGP unwrap, where the
/// algorithm choice arrives inside the encrypted payload and the context
/// can only be created once the payload has been recovered.
pub trait ContextFactory {
    /// Create a CFB-mode symmetric context for the given algorithm, ready
    /// to have its key loaded.
    fn create_cipher(&mut self, algo: PgpCipherAlgo) -> CryptResult<Box<dyn KeyContext>>;
}

/// Fill `out` with random bytes.
pub fn random_bytes(rng: &mut impl CryptoRngCore, out: &mut [u8]) -> CryptResult<()> {
    rng.try_fill_bytes(out).map_err(|_| CryptError::Failed)
}

/// Fill `out` with non-zero random bytes, as required by PKCS #1 padding
/// where a zero byte would terminate the padding region early.
pub fn random_nonzero(rng: &mut impl CryptoRngCore, out: &mut [u8]) -> CryptResult<()> {
    rng.try_fill_bytes(out).map_err(|_| CryptError::Failed)?;
    for index in 0..out.len() {
        while out[index] == 0 {
            let mut byte = [0u8; 1];
            rng.try_fill_bytes(&mut byte).map_err(|_| CryptError::Failed)?;
            out[index] = byte[0];
        }
    }
    Ok(())
}
