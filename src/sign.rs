//! PKCS #1 v1.5 signature mechanisms.
//!
//! Verification never parses the DigestInfo inside a signature: the
//! expected DigestInfo is re-encoded from the locally computed hash and
//! compared byte-for-byte against the recovered payload, so there are no
//! decoder gaps for a small-exponent forgery (Bleichenbacher '06) to hide
//! random data in.  Signing can run a verify-after-sign pass that
//! recovers the just-made signature and compares it with the original
//! plaintext, which converts an RSA-CRT fault into a clean failure
//! instead of a key-leaking signature.

use crate::asn1_read::{
    peek_tag, read_octet_string, read_oid, read_raw_object, read_sequence, OidInfo,
    Tag, BER_NULL, BER_SEQUENCE, WILDCARD_OID,
};
use crate::asn1_write::{sizeof_object, write_null, write_octet_string, write_sequence};
use crate::hashes::HashAlgo;
use crate::mech::{adjust_pkcs1_data, MechanismSignInfo};
use crate::stream::{ReadStream, WriteStream};
use crate::{
    ensure, CryptError, CryptResult, MAX_HASHSIZE, MAX_PKCSIZE, MIN_HASHSIZE, MIN_PKCSIZE,
};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/* DigestInfo AlgorithmIdentifier OIDs.  MD5 is deliberately absent: no
   new signature may use it and verification of the SSL format doesn't
   involve DigestInfo at all */

const OID_SHA1: &[u8] = &[0x06, 0x05, 0x2B, 0x0E, 0x03, 0x02, 0x1A];
const OID_SHA256: &[u8] =
    &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
const OID_SHA384: &[u8] =
    &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];
const OID_SHA512: &[u8] =
    &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

fn hash_oid(hash_algo: HashAlgo) -> CryptResult<&'static [u8]> {
    match hash_algo {
        HashAlgo::Sha1 => Ok(OID_SHA1),
        HashAlgo::Sha256 => Ok(OID_SHA256),
        HashAlgo::Sha384 => Ok(OID_SHA384),
        HashAlgo::Sha512 => Ok(OID_SHA512),
        HashAlgo::Md5 => Err(CryptError::NotAvail),
    }
}

const HASH_OID_TABLE: &[OidInfo<Option<HashAlgo>>] = &[
    OidInfo { oid: OID_SHA1, selection: Some(HashAlgo::Sha1) },
    OidInfo { oid: OID_SHA256, selection: Some(HashAlgo::Sha256) },
    OidInfo { oid: OID_SHA384, selection: Some(HashAlgo::Sha384) },
    OidInfo { oid: OID_SHA512, selection: Some(HashAlgo::Sha512) },
    OidInfo { oid: WILDCARD_OID, selection: None },
];

fn sizeof_null() -> usize {
    2
}

fn sizeof_algo_id(hash_algo: HashAlgo) -> CryptResult<usize> {
    Ok(sizeof_object(hash_oid(hash_algo)?.len() + sizeof_null()))
}

fn sizeof_message_digest(hash_algo: HashAlgo) -> CryptResult<usize> {
    let algo_info_size = sizeof_algo_id(hash_algo)?;
    let hash_info_size = sizeof_object(hash_algo.size());
    Ok(sizeof_object(algo_info_size + hash_info_size))
}

/// Write a DigestInfo record: `SEQUENCE { AlgorithmIdentifier,
/// OCTET STRING digest }`.
fn write_message_digest(
    stream: &mut WriteStream<'_>, hash_algo: HashAlgo, hash: &[u8],
) -> CryptResult<()> {
    debug_assert!(hash.len() == hash_algo.size());
    let oid = hash_oid(hash_algo)?;

    write_sequence(stream, sizeof_algo_id(hash_algo)? + sizeof_object(hash.len()))?;
    write_sequence(stream, oid.len() + sizeof_null())?;
    stream.write(oid)?;
    write_null(stream, Tag::Default)?;
    write_octet_string(stream, hash, Tag::Default)
}

/// Decode a DigestInfo record, used only as a redundant sanity pass so
/// that a corrupted encoding reports the right error class.  An
/// unrecognised digest algorithm is [`CryptError::NotAvail`].
fn read_message_digest(
    stream: &mut ReadStream<'_>, hash: &mut [u8],
) -> CryptResult<(HashAlgo, usize)> {
    read_sequence(stream)?;
    read_sequence(stream)?;
    let hash_algo = read_oid(stream, HASH_OID_TABLE)?.ok_or(CryptError::NotAvail)?;
    /* The parameters field is an explicit NULL for every algorithm here,
       but some encoders omit it entirely */
    if stream.data_left() > 0 && peek_tag(stream)? == BER_NULL {
        crate::asn1_read::read_null(stream)?;
    }
    let hash_size = read_octet_string(stream, Some(hash), MIN_HASHSIZE, MAX_HASHSIZE)?;
    if hash_size != hash_algo.size() {
        return Err(CryptError::BadData);
    }
    Ok((hash_algo, hash_size))
}

/* There's no minimum-height requirement for PKCS #1 signature padding the
   way there is for encryption, but a set minimum number of 0xFF bytes is
   required anyway: if they're not present then something funny is going
   on.  For a given key size everything except the 3 format bytes, the
   (2 + 15 + 2)-byte ASN.1 wrapper and the hash must be 0xFF */

fn get_min_pad_bytes(length: usize) -> usize {
    length - (3 + 19 + MAX_HASHSIZE)
}

/// Encode the PKCS #1 signature payload
/// `[ 0 ][ 1 ][ 0xFF padding ][ 0 ][ DigestInfo ]` to exactly `length`
/// bytes.
pub(crate) fn encode_pkcs1(
    stream: &mut WriteStream<'_>, hash_algo: HashAlgo, hash: &[u8], length: usize,
) -> CryptResult<()> {
    debug_assert!((MIN_PKCSIZE..=MAX_PKCSIZE).contains(&length));

    let payload_size = sizeof_message_digest(hash_algo)?;
    stream.putc(0)?;
    stream.putc(1)?;
    for _i in 0..length - (payload_size + 3) {
        stream.putc(0xFF)?;
    }
    stream.putc(0)?;
    write_message_digest(stream, hash_algo, hash)
}

/// Decode the PKCS #1 signature envelope, leaving the stream positioned
/// at the DigestInfo.  Insufficient or excessive 0xFF padding is
/// rejected.
pub(crate) fn decode_pkcs1(stream: &mut ReadStream<'_>, length: usize) -> CryptResult<()> {
    debug_assert!((MIN_PKCSIZE..=MAX_PKCSIZE).contains(&length));

    /* Note that some implementations have bignum code that zero-truncates
       the RSA output, removing the leading zero; it's the lower crypto
       layer's job (adjust_pkcs1_data()) to have restored it by now */
    if stream.getc()? != 0 || stream.getc()? != 1 {
        /* No [ 0 ][ 1 ] at start */
        return Err(CryptError::BadData);
    }
    let mut ch = 0xFF;
    let mut index = 2;
    while index < length - MIN_HASHSIZE && ch == 0xFF {
        ch = stream.getc().map_err(|_| CryptError::BadData)?;
        index += 1;
    }
    if ch != 0 || index < get_min_pad_bytes(length) || index >= length - MIN_HASHSIZE {
        /* No [ 0 ] at end or insufficient/excessive 0xFF padding */
        return Err(CryptError::BadData);
    }

    Ok(())
}

/// Compare the ASN.1-encoded hash value in the signature with the local
/// hash information.
///
/// Letting random data hide in gaps of the encoding would allow signature
/// forgery when small public exponents are in use, so instead of
/// validity-checking every field of the externally-supplied encoding, the
/// locally-known hash value is encoded into the canonical DigestInfo form
/// and the two encodings compared as opaque bytes.
pub(crate) fn compare_hash_info(
    stream: &mut ReadStream<'_>, hash_algo: HashAlgo, hash: &[u8],
) -> CryptResult<()> {
    /* Read the encoded hash data as a blob and make sure that that's all
       of the data */
    let mut encoded_md = Zeroizing::new([0u8; 32 + MAX_HASHSIZE]);
    let encoded_md_length =
        read_raw_object(stream, &mut encoded_md[..], Some(BER_SEQUENCE))?;
    if stream.data_left() != 0 {
        return Err(CryptError::BadData);
    }

    /* Write the supplied hash information into an encoded blob */
    let mut recreated_md = Zeroizing::new([0u8; 32 + MAX_HASHSIZE]);
    let mut md_stream = WriteStream::new(&mut recreated_md[..]);
    write_message_digest(&mut md_stream, hash_algo, hash)?;
    let recreated_md_length = md_stream.tell();

    /* An encode-and-compare converts every mismatch into the same error,
       but a corrupted encoding in front of the hash should really be
       bad-data rather than bad-signature.  A redundant decode pass over
       the encoded blob sorts the corrupted-encoding cases out first */
    let mut dummy_hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let mut md_read = ReadStream::new(&encoded_md[..encoded_md_length]);
    let _decoded = read_message_digest(&mut md_read, &mut dummy_hash[..])?;

    if encoded_md_length != recreated_md_length
        || !bool::from(
            encoded_md[..encoded_md_length].ct_eq(&recreated_md[..recreated_md_length]),
        )
    {
        return Err(CryptError::Signature);
    }

    Ok(())
}

/// Make sure that the recovered signature data matches the data that was
/// originally signed, defending against RSA-CRT fault attacks.
fn check_recovered_signature(
    sign_context: &mut dyn crate::kernel::PkcContext, sig_data: &[u8], signature: &[u8],
) -> CryptResult<()> {
    debug_assert!(sig_data.len() >= MIN_PKCSIZE && signature.len() >= MIN_PKCSIZE);

    /* Recover the original signature data, unless the key turns out not
       to be usable for signature checking, in which case there's not much
       that can be done */
    let mut recovered = Zeroizing::new([0u8; MAX_PKCSIZE]);
    recovered[..signature.len()].copy_from_slice(signature);
    match sign_context.sigcheck(&mut recovered[..signature.len()]) {
        Ok(()) => {}
        Err(CryptError::Permission | CryptError::NotAvail) => return Ok(()),
        Err(_) => return Err(CryptError::Failed),
    }

    /* Make sure that the recovered data matches the original data */
    if sig_data.len() != signature.len()
        || !bool::from(sig_data.ct_eq(&recovered[..signature.len()]))
    {
        return Err(CryptError::Failed);
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SignType {
    Pkcs1,
    #[cfg(feature = "legacy")]
    Ssl,
}

fn sign(info: &mut MechanismSignInfo<'_>, sign_type: SignType) -> CryptResult<()> {
    /* Get various algorithm parameters */
    let length = info.sign_context.key_size();
    ensure!((MIN_PKCSIZE..=MAX_PKCSIZE).contains(&length), CryptError::NotAvail);
    let hash_algo = info.hash_context.algo();
    let side_channel_protection = info.sign_context.side_channel_protection();

    /* If this is just a length check, we're done */
    let Some(signature) = info.signature.as_deref_mut() else {
        info.signature_length = length;
        return Ok(());
    };
    ensure!(signature.len() >= length, CryptError::Overflow);
    let signature = &mut signature[..length];
    signature.fill(0);

    /* Get the hash data and encode the payload as required */
    let mut hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let hash_size = info.hash_context.hash_value(&mut hash[..])?;

    let mut stream = WriteStream::new(signature);
    let encode_result = match sign_type {
        SignType::Pkcs1 => {
            encode_pkcs1(&mut stream, hash_algo, &hash[..hash_size], length)
        }
        #[cfg(feature = "legacy")]
        SignType::Ssl => {
            /* The payload is the concatenated MD5 and SHA-1 hashes with
               no DigestInfo wrapper:
               [ 0 ][ 1 ][ 0xFF padding ][ 0 ][ MD5 hash ][ SHA1 hash ] */
            ensure!(hash_algo == HashAlgo::Md5, CryptError::BadData);
            let hash_context2 = info.hash_context2.ok_or(CryptError::BadData)?;
            let mut hash2 = Zeroizing::new([0u8; MAX_HASHSIZE]);
            let hash_size2 = hash_context2.hash_value(&mut hash2[..])?;
            (|| {
                stream.putc(0)?;
                stream.putc(1)?;
                for _i in 0..length - (hash_size + hash_size2 + 3) {
                    stream.putc(0xFF)?;
                }
                stream.putc(0)?;
                stream.write(&hash[..hash_size])?;
                stream.write(&hash2[..hash_size2])
            })()
        }
    };
    let written = stream.tell();
    if let Err(err) = encode_result {
        signature.fill(0);
        return Err(err);
    }
    debug_assert!(written == length);

    /* If side-channel protection is on, remember a copy of the signature
       data so that it can be checked against the recovered form */
    let mut pre_sig_data = Zeroizing::new([0u8; MAX_PKCSIZE]);
    if side_channel_protection {
        pre_sig_data[..length].copy_from_slice(signature);
    }

    /* Sign the data */
    if let Err(err) = info.sign_context.sign(signature) {
        signature.fill(0);
        return Err(err);
    }

    /* Check that the signature verifies */
    if side_channel_protection {
        if let Err(err) =
            check_recovered_signature(info.sign_context, &pre_sig_data[..length], signature)
        {
            signature.fill(0);
            info.signature_length = 0;
            return Err(err);
        }
    }
    info.signature_length = length;

    Ok(())
}

fn sigcheck(info: &mut MechanismSignInfo<'_>, sign_type: SignType) -> CryptResult<()> {
    /* Get various algorithm parameters */
    let length = info.sign_context.key_size();
    ensure!((MIN_PKCSIZE..=MAX_PKCSIZE).contains(&length), CryptError::NotAvail);
    let hash_algo = info.hash_context.algo();
    let signature = info.signature.as_deref().ok_or(CryptError::BadData)?;
    ensure!(info.signature_length <= signature.len(), CryptError::BadData);

    /* Format-adjust the input so that the raw transform sees exactly the
       modulus length */
    let mut decrypted = Zeroizing::new([0u8; MAX_PKCSIZE]);
    adjust_pkcs1_data(&mut decrypted[..], &signature[..info.signature_length], length)?;

    /* Recover the signed data */
    info.sign_context.sigcheck(&mut decrypted[..length])?;

    /* Decode the payload as required */
    let mut stream = ReadStream::new(&decrypted[..length]);
    match sign_type {
        SignType::Pkcs1 => {
            /* The payload is an ASN.1-encoded hash, process it very
               carefully */
            decode_pkcs1(&mut stream, length)?;
            let mut hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
            let hash_size = info.hash_context.hash_value(&mut hash[..])?;
            compare_hash_info(&mut stream, hash_algo, &hash[..hash_size])?;
        }
        #[cfg(feature = "legacy")]
        SignType::Ssl => {
            ensure!(hash_algo == HashAlgo::Md5, CryptError::BadData);
            let hash_context2 = info.hash_context2.ok_or(CryptError::BadData)?;

            /* The payload is [ MD5 hash ][ SHA1 hash ] */
            decode_pkcs1(&mut stream, length)?;
            let mut hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
            let mut hash2 = Zeroizing::new([0u8; MAX_HASHSIZE]);
            stream.read(&mut hash[..16]).map_err(|_| CryptError::BadData)?;
            stream.read(&mut hash2[..20]).map_err(|_| CryptError::BadData)?;

            /* Make sure that the two hash values match; the compare
               operation is a generic yes/no, so convert a mismatch into
               the more specific signature error */
            if !info.hash_context.compare_hash(&hash[..16])
                || !hash_context2.compare_hash(&hash2[..20])
            {
                return Err(CryptError::Signature);
            }

            /* Make sure that's all that there is.  This falls out of
               compare_hash_info() for standard signatures but has to be
               checked explicitly for the SSL format */
            if stream.data_left() != 0 {
                return Err(CryptError::BadData);
            }
        }
    }

    Ok(())
}

/// Generate a PKCS #1 v1.5 signature over the completed hash context.
pub fn sign_pkcs1(info: &mut MechanismSignInfo<'_>) -> CryptResult<()> {
    sign(info, SignType::Pkcs1)
}

/// Verify a PKCS #1 v1.5 signature against the completed hash context.
pub fn sigcheck_pkcs1(info: &mut MechanismSignInfo<'_>) -> CryptResult<()> {
    sigcheck(info, SignType::Pkcs1)
}

/// Generate an SSL 3.0 dual-hash signature (MD5 + SHA-1 contexts).
#[cfg(feature = "legacy")]
pub fn sign_ssl(info: &mut MechanismSignInfo<'_>) -> CryptResult<()> {
    sign(info, SignType::Ssl)
}

/// Verify an SSL 3.0 dual-hash signature.
#[cfg(feature = "legacy")]
pub fn sigcheck_ssl(info: &mut MechanismSignInfo<'_>) -> CryptResult<()> {
    sigcheck(info, SignType::Ssl)
}
