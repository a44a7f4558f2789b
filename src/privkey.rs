//! Private-key wrap mechanisms.
//!
//! PKCS #15/#8 wrap is the ASN.1 private-key representation, PKCS #5
//! padded and CBC encrypted; unwrap validates the recovered DER length
//! and padding and reports any mismatch as a wrong key, because a bad
//! passphrase is overwhelmingly the actual cause.  The three PGP
//! generations are import-only: PGP 2.x encrypts just the MPI value
//! bytes with cleartext length prefixes and a 16-bit checksum, the
//! transitional OpenPGP format encrypts the whole blob but keeps the
//! checksum, and modern OpenPGP replaces the checksum with a SHA-1 MDC.

use crate::asn1_check::get_object_length;
use crate::hashes::{hash_atomic, HashAlgo};
use crate::kernel::{CipherContext, PrivateKeyFormat};
use crate::mech::{MechanismPrivkUnwrapInfo, MechanismPrivkWrapInfo};
use crate::stream::WriteStream;
use crate::wire::bits_to_bytes;
use crate::{
    ensure, CryptError, CryptResult, MAX_IVSIZE, MAX_PKCSIZE, MIN_PKCSIZE,
};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/* No serialised private key is smaller than this */

const MIN_PRIVATE_KEYSIZE: usize = 16;

/// Check that unwrapped PKCS #15/#8 data decodes to a clean DER object
/// followed by valid PKCS #5 padding.
///
/// The check runs in reverse of the usual padding validation: the payload
/// size is known from the ASN.1 so the expected padding value can be
/// computed and verified, which catches bit-flipping at the end of the
/// encrypted data (Klima-Rosa style attacks) essentially for free.
fn check_key_integrity(data: &[u8], block_size: usize) -> CryptResult<()> {
    debug_assert!(data.len() >= MIN_PRIVATE_KEYSIZE);
    debug_assert!(block_size >= 8 && block_size <= MAX_IVSIZE);

    /* Get the length of the encapsulated ASN.1 object */
    let length = get_object_length(data).map_err(|err| match err {
        CryptError::BadData | CryptError::Underflow => CryptError::WrongKey,
        other => other,
    })?;

    /* Check the expected padding */
    let pad_size = block_size - (length & (block_size - 1));
    if pad_size > MAX_IVSIZE || length + pad_size > data.len() {
        return Err(CryptError::WrongKey);
    }
    for &pad_byte in &data[length..length + pad_size] {
        if pad_byte != pad_size as u8 {
            return Err(CryptError::WrongKey);
        }
    }

    Ok(())
}

fn private_key_wrap(
    info: &mut MechanismPrivkWrapInfo<'_>, format: PrivateKeyFormat,
) -> CryptResult<()> {
    /* Get the payload details via a dry-run encode */
    let mut null_stream = WriteStream::null();
    info.key_context.write_private_key(&mut null_stream, format)?;
    let payload_size = null_stream.tell();
    ensure!(payload_size >= MIN_PRIVATE_KEYSIZE, CryptError::BadData);

    let block_size = info.wrap_context.block_size();
    ensure!(block_size >= 8 && block_size <= MAX_IVSIZE, CryptError::BadData);
    let pad_size = ((payload_size + 1 + block_size - 1) & !(block_size - 1)) - payload_size;
    debug_assert!((1..=block_size).contains(&pad_size));
    debug_assert!((payload_size + pad_size) & (block_size - 1) == 0);

    /* If this is just a length check, we're done */
    let Some(wrapped_data) = info.wrapped_data.as_deref_mut() else {
        info.wrapped_data_length = payload_size + pad_size;
        return Ok(());
    };

    /* Make sure that the wrapped key fits in the output buffer */
    if payload_size + pad_size > wrapped_data.len() {
        return Err(CryptError::Overflow);
    }
    let wrapped_data = &mut wrapped_data[..payload_size + pad_size];
    wrapped_data.fill(0);

    let result = (|| {
        /* Write the private key data and PKCS #5-pad it */
        let mut stream = WriteStream::new(wrapped_data);
        info.key_context.write_private_key(&mut stream, format)?;
        ensure!(stream.tell() == payload_size, CryptError::Failed);
        for pad_byte in &mut wrapped_data[payload_size..] {
            *pad_byte = pad_size as u8;
        }

        /* Sample the first and last 8 bytes so that it's checkable that
           they really were encrypted */
        let mut start_sample = [0u8; 8];
        let mut end_sample = [0u8; 8];
        start_sample.copy_from_slice(&wrapped_data[..8]);
        end_sample.copy_from_slice(&wrapped_data[wrapped_data.len() - 8..]);

        let status = info.wrap_context.encrypt(wrapped_data);
        let unchanged = bool::from(start_sample.ct_eq(&wrapped_data[..8]))
            || bool::from(end_sample.ct_eq(&wrapped_data[wrapped_data.len() - 8..]));
        start_sample.zeroize();
        end_sample.zeroize();
        status?;
        if unchanged {
            return Err(CryptError::Failed);
        }
        Ok(())
    })();
    if let Err(err) = result {
        wrapped_data.fill(0);
        return Err(err);
    }
    info.wrapped_data_length = payload_size + pad_size;

    Ok(())
}

fn private_key_unwrap(
    info: &mut MechanismPrivkUnwrapInfo<'_>, format: PrivateKeyFormat,
) -> CryptResult<()> {
    /* The data must be a sane length and a multiple of the cipher block
       size; CBC mode is forced so this always holds for valid data */
    let block_size = info.wrap_context.block_size();
    ensure!(block_size >= 8 && block_size <= MAX_IVSIZE, CryptError::BadData);
    ensure!(info.wrapped_data.len() >= MIN_PRIVATE_KEYSIZE, CryptError::Underflow);
    if info.wrapped_data.len() & (block_size - 1) != 0 {
        return Err(CryptError::BadData);
    }

    /* Decrypt the data into a temporary buffer, verify its integrity and
       read it into the context.  A corrupted-data result here is far more
       likely to mean the wrong decryption key than actual corruption */
    let mut buffer = info.wrapped_data.to_vec();
    let result = (|| {
        info.wrap_context.decrypt(&mut buffer)?;
        check_key_integrity(&buffer, block_size)?;
        info.key_context.read_private_key(&buffer, format)
    })();
    buffer.zeroize();
    result
}

/// Wrap a private key in the PKCS #15 format.
pub fn export_private_key(info: &mut MechanismPrivkWrapInfo<'_>) -> CryptResult<()> {
    private_key_wrap(info, PrivateKeyFormat::Pkcs15)
}

/// Unwrap a PKCS #15 wrapped private key.
pub fn import_private_key(info: &mut MechanismPrivkUnwrapInfo<'_>) -> CryptResult<()> {
    private_key_unwrap(info, PrivateKeyFormat::Pkcs15)
}

/// Wrap a private key in the older PKCS #8 format.
pub fn export_private_key_pkcs8(info: &mut MechanismPrivkWrapInfo<'_>) -> CryptResult<()> {
    private_key_wrap(info, PrivateKeyFormat::Pkcs8)
}

/// Unwrap a PKCS #8 wrapped private key.
pub fn import_private_key_pkcs8(
    info: &mut MechanismPrivkUnwrapInfo<'_>,
) -> CryptResult<()> {
    private_key_unwrap(info, PrivateKeyFormat::Pkcs8)
}

/****************************************************************************
*                                                                           *
*                   PGP Private-Key Unwrap Mechanisms                       *
*                                                                           *
****************************************************************************/

/* The PGP 2.x key wrap encrypts only the MPI payload bytes, leaving each
   two-byte length prefix in the clear, so each component has to be
   located and decrypted separately:

    PGP2:        mpi_enc( d ), mpi_enc( p ), mpi_enc( q ), mpi_enc( u ),
                 uint16 checksum
    OpenPGP old: enc( mpi [...], uint16 checksum )
    OpenPGP:     enc( mpi [...], byte[20] mdc ) */

/// Decrypt one cleartext-length MPI in place, returning the bytes
/// consumed.
fn pgp_decrypt_mpi(
    data: &mut [u8], cipher: &mut dyn CipherContext, min_length: usize, max_length: usize,
) -> CryptResult<usize> {
    ensure!(data.len() >= 2, CryptError::Underflow);
    let bits = usize::from(data[0]) << 8 | usize::from(data[1]);
    let value_length = bits_to_bytes(bits);
    if value_length < min_length || value_length > max_length + 2 {
        return Err(CryptError::BadData);
    }
    ensure!(data.len() >= 2 + value_length, CryptError::Underflow);
    cipher.decrypt(&mut data[2..2 + value_length])?;
    Ok(2 + value_length)
}

/// Decrypt the four RSA key components of a PGP 2.x private key,
/// returning the number of bytes covered by the trailing checksum.
fn pgp2_decrypt_key(
    data: &mut [u8], cipher: &mut dyn CipherContext,
) -> CryptResult<usize> {
    ensure!(data.len() >= MIN_PRIVATE_KEYSIZE, CryptError::Underflow);

    /* d, then p, q and u */
    let mut position = pgp_decrypt_mpi(data, cipher, bits_to_bytes(155), MAX_PKCSIZE)?;
    for _i in 0..3 {
        position += pgp_decrypt_mpi(&mut data[position..], cipher, MIN_PKCSIZE / 2,
                                    MAX_PKCSIZE)?;
    }
    Ok(position)
}

/// Verify the PGP 2.x additive checksum over the MPI data.
///
/// The checksumming is inconsistent with the encryption: only the MPI
/// values are encrypted but the lengths and values are checksummed, and
/// since the components sit consecutively in memory the whole region can
/// be summed as one block.
fn check_pgp2_key_integrity(data: &[u8], key_data_length: usize) -> CryptResult<()> {
    ensure!(key_data_length >= MIN_PRIVATE_KEYSIZE, CryptError::BadData);
    ensure!(key_data_length + 2 <= data.len(), CryptError::BadData);

    let mut checksum = 0u16;
    for &byte in &data[..key_data_length] {
        checksum = checksum.wrapping_add(u16::from(byte));
    }
    let stored = &data[key_data_length..key_data_length + 2];
    if checksum.to_be_bytes() != stored {
        return Err(CryptError::WrongKey);
    }
    Ok(())
}

/// Verify the OpenPGP SHA-1 MDC over the decrypted key data.
fn check_openpgp_key_integrity(data: &[u8]) -> CryptResult<()> {
    let hash_size = HashAlgo::Sha1.size();

    /* Make sure that there's room for minimal-length data plus the MDC */
    if data.len() < bits_to_bytes(155) + hash_size {
        return Err(CryptError::BadData);
    }
    let (key_data, stored_mdc) = data.split_at(data.len() - hash_size);

    let mut hash_value = [0u8; crate::MAX_HASHSIZE];
    hash_atomic(HashAlgo::Sha1, &mut hash_value, &[key_data]);
    let matches = bool::from(hash_value[..hash_size].ct_eq(stored_mdc));
    hash_value.zeroize();
    if !matches {
        return Err(CryptError::WrongKey);
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PgpWrapType {
    Pgp2,
    OpenPgpOld,
    OpenPgp,
}

fn private_key_unwrap_pgp(
    info: &mut MechanismPrivkUnwrapInfo<'_>, wrap_type: PgpWrapType,
) -> CryptResult<()> {
    ensure!(info.wrapped_data.len() >= MIN_PRIVATE_KEYSIZE, CryptError::Underflow);

    /* Copy the encrypted private-key data to a temporary buffer and
       decrypt it */
    let mut buffer = info.wrapped_data.to_vec();
    let result = (|| {
        let bytes_to_checksum = if wrap_type == PgpWrapType::Pgp2 {
            pgp2_decrypt_key(&mut buffer, info.wrap_context)?
        } else {
            info.wrap_context.decrypt(&mut buffer)?;
            /* The transitional format uses the PGP 2.x checksum over
               everything up to the checksum itself */
            buffer.len().saturating_sub(2)
        };

        /* Perform one of PGP's assorted key checksumming operations and
           read the key data into the context */
        match wrap_type {
            PgpWrapType::Pgp2 | PgpWrapType::OpenPgpOld => {
                check_pgp2_key_integrity(&buffer, bytes_to_checksum)?;
            }
            PgpWrapType::OpenPgp => check_openpgp_key_integrity(&buffer)?,
        }
        info.key_context
            .read_private_key(&buffer, PrivateKeyFormat::Pgp)
            .map_err(|err| match err {
                CryptError::BadData => CryptError::WrongKey,
                other => other,
            })
    })();
    buffer.zeroize();
    result
}

/// Unwrap a PGP 2.x private key (per-MPI encryption, additive checksum).
pub fn import_private_key_pgp2(info: &mut MechanismPrivkUnwrapInfo<'_>) -> CryptResult<()> {
    private_key_unwrap_pgp(info, PgpWrapType::Pgp2)
}

/// Unwrap a transitional OpenPGP private key (whole-blob encryption,
/// PGP 2.x checksum).
pub fn import_private_key_openpgp_old(
    info: &mut MechanismPrivkUnwrapInfo<'_>,
) -> CryptResult<()> {
    private_key_unwrap_pgp(info, PgpWrapType::OpenPgpOld)
}

/// Unwrap an OpenPGP private key (whole-blob encryption, SHA-1 MDC).
pub fn import_private_key_openpgp(
    info: &mut MechanismPrivkUnwrapInfo<'_>,
) -> CryptResult<()> {
    private_key_unwrap_pgp(info, PgpWrapType::OpenPgp)
}
