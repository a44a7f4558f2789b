//! Mechanism descriptors and dispatch.
//!
//! Each mechanism family takes its own descriptor record; the records are
//! unified only by the dispatch enums at the bottom of this module.  All
//! descriptors follow the same convention for size queries: a `None`
//! output buffer means "tell me how big the result will be" and the
//! mechanism fills in the length without performing any crypto.

use crate::hashes::HashAlgo;
use crate::kernel::{
    CipherContext, ContextFactory, HashContext, KeyContext, PkcContext, PrivateKeyContext,
};
use crate::{ensure, CryptError, CryptResult, MAX_PKCSIZE, MIN_PKCSIZE};
use rand_core::CryptoRngCore;

/// Descriptor for the raw-data key-derivation mechanisms.  Output length
/// is requested through `data_out.len()`.
pub struct MechanismDeriveInfo<'a> {
    /// Derived keying material, filled to its full length.
    pub data_out: &'a mut [u8],
    /// The password or master secret to derive from.
    pub data_in: &'a [u8],
    /// Salt or seed.  The PKCS #12 mechanism treats the first byte as the
    /// diversifier.
    pub salt: &'a [u8],
    /// Hash (or HMAC hash) algorithm driving the derivation.
    pub hash_algo: HashAlgo,
    /// Iteration count; for OpenPGP S2K this is the pre-decoded
    /// iterated-count specifier divided by 64.
    pub iterations: usize,
}

/// Descriptor for KDF-mode derivation, which moves keying material
/// between contexts instead of raw buffers.
pub struct MechanismKdfInfo<'a> {
    /// Context holding the master secret.
    pub master_key_context: &'a dyn KeyContext,
    /// Context the derived key is loaded into.
    pub key_context: &'a mut dyn KeyContext,
    /// Salt or seed.
    pub salt: &'a [u8],
    /// HMAC hash algorithm.
    pub hash_algo: HashAlgo,
}

/// Descriptor for signature generation and verification.
pub struct MechanismSignInfo<'a> {
    /// Signature buffer: `None` requests a size query on signing.  On
    /// verification this is the signature to check.
    pub signature: Option<&'a mut [u8]>,
    /// Signature length: set on signing, given on verification.
    pub signature_length: usize,
    /// Signing or verification key.
    pub sign_context: &'a mut dyn PkcContext,
    /// Completed hash of the signed data.
    pub hash_context: &'a dyn HashContext,
    /// Second completed hash, used only by the SSL dual-hash variant.
    pub hash_context2: Option<&'a dyn HashContext>,
}

/// The payload source for public-key key transport.
pub enum WrapPayload<'a> {
    /// Wrap the keying material held in a session-key context.
    Key(&'a dyn KeyContext),
    /// Wrap caller-supplied raw data (the TLS premaster secret).
    Raw(&'a [u8]),
}

/// Descriptor for public-key key-transport wrap (PKCS #1 v1.5, OAEP,
/// PGP).
pub struct MechanismPkcWrapInfo<'a> {
    /// Wrapped-key output; `None` requests a size query.
    pub wrapped_data: Option<&'a mut [u8]>,
    /// Length of the produced wrapped key.
    pub wrapped_data_length: usize,
    /// The recipient's public-key context.
    pub wrap_context: &'a mut dyn PkcContext,
    /// What gets wrapped.
    pub payload: WrapPayload<'a>,
    /// MGF hash algorithm for OAEP; ignored by the PKCS #1 mechanisms.
    pub aux_hash: HashAlgo,
}

/// Where the recovered payload of a public-key unwrap goes.
pub enum UnwrapTarget<'a> {
    /// Load the recovered key into a session-key context.
    Key(&'a mut dyn KeyContext),
    /// Copy the recovered raw data out; its length must match the buffer
    /// exactly (the TLS premaster secret).
    Raw(&'a mut [u8]),
    /// PGP: create a context of the algorithm named inside the payload
    /// and load the key into it.
    PgpCreate {
        /// Factory for the new context.
        factory: &'a mut dyn ContextFactory,
        /// Receives the created, keyed context.
        context: &'a mut Option<Box<dyn KeyContext>>,
    },
}

/// Descriptor for public-key key-transport unwrap.
pub struct MechanismPkcUnwrapInfo<'a> {
    /// The wrapped key.
    pub wrapped_data: &'a [u8],
    /// The recipient's private-key context.
    pub wrap_context: &'a mut dyn PkcContext,
    /// Where the recovered payload goes.
    pub target: UnwrapTarget<'a>,
    /// MGF hash algorithm for OAEP; ignored by the PKCS #1 mechanisms.
    pub aux_hash: HashAlgo,
}

/// Descriptor for CMS symmetric key wrap.
pub struct MechanismCmsWrapInfo<'a> {
    /// Wrapped-key output; `None` requests a size query.
    pub wrapped_data: Option<&'a mut [u8]>,
    /// Length of the produced wrapped key.
    pub wrapped_data_length: usize,
    /// Context holding the session key being wrapped.
    pub key_context: &'a dyn KeyContext,
    /// CBC-mode KEK context.
    pub wrap_context: &'a mut dyn CipherContext,
}

/// Descriptor for CMS symmetric key unwrap.
pub struct MechanismCmsUnwrapInfo<'a> {
    /// The wrapped key.
    pub wrapped_data: &'a [u8],
    /// Context the recovered session key is loaded into.
    pub key_context: &'a mut dyn KeyContext,
    /// CBC-mode KEK context.
    pub wrap_context: &'a mut dyn CipherContext,
}

/// Descriptor for private-key wrap.
pub struct MechanismPrivkWrapInfo<'a> {
    /// Wrapped-key output; `None` requests a size query.
    pub wrapped_data: Option<&'a mut [u8]>,
    /// Length of the produced wrapped key.
    pub wrapped_data_length: usize,
    /// The private key being wrapped.
    pub key_context: &'a dyn PrivateKeyContext,
    /// CBC-mode KEK context.
    pub wrap_context: &'a mut dyn CipherContext,
}

/// Descriptor for private-key unwrap.
pub struct MechanismPrivkUnwrapInfo<'a> {
    /// The wrapped key.
    pub wrapped_data: &'a [u8],
    /// Context the recovered private key is loaded into.
    pub key_context: &'a mut dyn PrivateKeyContext,
    /// KEK context (CBC, or CFB for the PGP variants).
    pub wrap_context: &'a mut dyn CipherContext,
}

/* The length of the input data for PKCS #1 transforms is usually the key
   size, but a value that travelled through an ASN.1 INTEGER can arrive
   zero-padded (sign handling) or zero-truncated (broken bignum code).
   Handling this belongs at the mechanism layer: it's an encoding issue
   that shouldn't be visible to the raw crypto, and handling it anywhere
   higher would need duplicating between signatures and encryption */

/// Adjust PKCS #1 input data to exactly the modulus length: strip leading
/// zero bytes if over-long, left-pad with zeroes if short.  Suspiciously
/// short values are rejected rather than padded.
pub fn adjust_pkcs1_data(
    out_data: &mut [u8], in_data: &[u8], key_size: usize,
) -> CryptResult<()> {
    debug_assert!((MIN_PKCSIZE..=MAX_PKCSIZE).contains(&key_size));
    ensure!(key_size <= out_data.len(), CryptError::Overflow);
    ensure!(!in_data.is_empty() && in_data.len() <= out_data.len(), CryptError::BadData);

    /* Find the start of the data payload, refusing to process anything
       suspiciously short */
    let mut data = in_data;
    while data.len() >= MIN_PKCSIZE - 8 && data[0] == 0 {
        data = &data[1..];
    }
    if data.len() < MIN_PKCSIZE - 8 || data.len() > key_size {
        return Err(CryptError::BadData);
    }

    /* Move the data into fixed-length form, left-padded with zeroes to
       the key size */
    out_data[..key_size - data.len()].fill(0);
    out_data[key_size - data.len()..key_size].copy_from_slice(data);
    Ok(())
}

/// Key-derivation mechanism selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeriveMechanism {
    /// PBKDF2 (PKCS #5 v2).
    Pbkdf2,
    /// PKCS #12 password derivation.
    Pkcs12,
    /// SSL 3.0 PRF (legacy).
    #[cfg(feature = "legacy")]
    Ssl,
    /// TLS 1.0/1.1 PRF (legacy).
    #[cfg(feature = "legacy")]
    Tls,
    /// TLS 1.2 PRF.
    Tls12,
    /// CMP/Entrust password derivation.
    Cmp,
    /// OpenPGP S2K.
    OpenPgp,
}

/// Dispatch a key-derivation mechanism.
pub fn derive(
    mechanism: DeriveMechanism, info: &mut MechanismDeriveInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        DeriveMechanism::Pbkdf2 => crate::derive::derive_pbkdf2(info),
        DeriveMechanism::Pkcs12 => crate::derive::derive_pkcs12(info),
        #[cfg(feature = "legacy")]
        DeriveMechanism::Ssl => crate::derive::derive_ssl(info),
        #[cfg(feature = "legacy")]
        DeriveMechanism::Tls => crate::derive::derive_tls(info),
        DeriveMechanism::Tls12 => crate::derive::derive_tls12(info),
        DeriveMechanism::Cmp => crate::derive::derive_cmp(info),
        DeriveMechanism::OpenPgp => crate::derive::derive_pgp(info),
    }
}

/// Signature mechanism selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignMechanism {
    /// PKCS #1 v1.5 with DigestInfo.
    Pkcs1,
    /// SSL 3.0 dual-hash (legacy).
    #[cfg(feature = "legacy")]
    Ssl,
}

/// Dispatch signature generation.
pub fn sign(mechanism: SignMechanism, info: &mut MechanismSignInfo<'_>) -> CryptResult<()> {
    match mechanism {
        SignMechanism::Pkcs1 => crate::sign::sign_pkcs1(info),
        #[cfg(feature = "legacy")]
        SignMechanism::Ssl => crate::sign::sign_ssl(info),
    }
}

/// Dispatch signature verification.
pub fn sigcheck(
    mechanism: SignMechanism, info: &mut MechanismSignInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        SignMechanism::Pkcs1 => crate::sign::sigcheck_pkcs1(info),
        #[cfg(feature = "legacy")]
        SignMechanism::Ssl => crate::sign::sigcheck_ssl(info),
    }
}

/// Public-key key-transport mechanism selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkcWrapMechanism {
    /// PKCS #1 v1.5.
    Pkcs1,
    /// PKCS #1 v1.5 with the PGP algorithm-id/checksum payload.
    Pkcs1Pgp,
    /// RSA-OAEP.
    Oaep,
}

/// Dispatch public-key key-transport wrap.
pub fn export_key(
    mechanism: PkcWrapMechanism, rng: &mut impl CryptoRngCore,
    info: &mut MechanismPkcWrapInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        PkcWrapMechanism::Pkcs1 => crate::pkwrap::export_pkcs1(rng, info),
        PkcWrapMechanism::Pkcs1Pgp => crate::pkwrap::export_pkcs1_pgp(rng, info),
        PkcWrapMechanism::Oaep => crate::pkwrap::export_oaep(rng, info),
    }
}

/// Dispatch public-key key-transport unwrap.
pub fn import_key(
    mechanism: PkcWrapMechanism, info: &mut MechanismPkcUnwrapInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        PkcWrapMechanism::Pkcs1 => crate::pkwrap::import_pkcs1(info),
        PkcWrapMechanism::Pkcs1Pgp => crate::pkwrap::import_pkcs1_pgp(info),
        PkcWrapMechanism::Oaep => crate::pkwrap::import_oaep(info),
    }
}

/// Private-key wrap mechanism selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivateKeyWrapMechanism {
    /// PKCS #15 layout with PKCS #5 padding.
    Pkcs15,
    /// Older PKCS #8 layout with PKCS #5 padding.
    Pkcs8,
}

/// Dispatch private-key wrap.
pub fn export_private_key(
    mechanism: PrivateKeyWrapMechanism, info: &mut MechanismPrivkWrapInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        PrivateKeyWrapMechanism::Pkcs15 => crate::privkey::export_private_key(info),
        PrivateKeyWrapMechanism::Pkcs8 => crate::privkey::export_private_key_pkcs8(info),
    }
}

/// Dispatch private-key unwrap.
pub fn import_private_key(
    mechanism: PrivateKeyWrapMechanism, info: &mut MechanismPrivkUnwrapInfo<'_>,
) -> CryptResult<()> {
    match mechanism {
        PrivateKeyWrapMechanism::Pkcs15 => crate::privkey::import_private_key(info),
        PrivateKeyWrapMechanism::Pkcs8 => crate::privkey::import_private_key_pkcs8(info),
    }
}
