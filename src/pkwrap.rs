//! Public-key key-transport mechanisms: PKCS #1 v1.5 (standard, raw TLS
//! premaster and PGP variants) and RSA-OAEP.
//!
//! The unwrap paths are written to deny padding oracles a timing signal:
//! when the raw private-key transform itself fails, processing continues
//! over a fixed dummy block shaped like a maximum-length PKCS #1/OAEP
//! value, so the format check executes either way, and the error finally
//! reported is the remembered decrypt error.  OAEP decoding runs both
//! MGF1 computations before looking at any byte of the encoded block
//! (Manger's attack) and funnels every format condition into one late
//! reject point.

use crate::hashes::{HashAlgo, HashState};
use crate::kernel::{random_bytes, random_nonzero, KeyContext, PgpCipherAlgo, PkcContext};
use crate::mech::{
    adjust_pkcs1_data, MechanismPkcUnwrapInfo, MechanismPkcWrapInfo, UnwrapTarget,
    WrapPayload,
};
use crate::{
    ensure, CryptError, CryptResult, MAX_HASHSIZE, MAX_KEYSIZE, MAX_PKCSIZE,
    MAX_WORKING_KEYSIZE, MIN_KEYSIZE, MIN_PKCSIZE,
};
use rand_core::CryptoRngCore;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

/* Fixed-format maximum-length padding value that works for both PKCS #1
   and OAEP (the start looks valid but the padding check will fail).
   Substituted for the plaintext when the decrypt operation itself fails,
   so that the format check runs either way */

const FIXED_FORMATTED_VALUE: [u8; MAX_PKCSIZE] = {
    let mut value = [0x55u8; MAX_PKCSIZE];
    value[0] = 0x00;
    value[1] = 0x02;
    value
};

/* When recovering a PKCS #1 block the payload length is checked against
   this.  Usually it's MAX_WORKING_KEYSIZE, but what TLS wraps is a
   48-byte premaster secret rather than an actual key */

const MAX_PAYLOAD_SIZE: usize = 48;

/****************************************************************************
*                                                                           *
*                             Utility Routines                              *
*                                                                           *
****************************************************************************/

/* PGP checksums the PKCS #1 wrapped data even though this doesn't really
   serve any purpose, since any decryption error will corrupt the PKCS #1
   padding with vastly higher probability than a 16-bit sum */

fn pgp_checksum(data: &[u8]) -> u16 {
    let mut checksum = 0u16;
    for &byte in data {
        checksum = checksum.wrapping_add(u16::from(byte));
    }
    checksum
}

/// Append the 16-bit MPI checksum after `key_data_length` bytes of key.
fn pgp_generate_checksum(data: &mut [u8], key_data_length: usize) {
    debug_assert!(data.len() == key_data_length + 2);
    let checksum = pgp_checksum(&data[..key_data_length]);
    data[key_data_length..].copy_from_slice(&checksum.to_be_bytes());
}

fn pgp_verify_checksum(data: &[u8]) -> bool {
    debug_assert!(data.len() > 2);
    let (key_data, stored) = data.split_at(data.len() - 2);
    pgp_checksum(key_data).to_be_bytes() == stored
}

/// PGP carries the session-key algorithm alongside the key itself, so a
/// context of the right type has to be created as part of the import.
fn pgp_extract_key(
    factory: &mut dyn crate::kernel::ContextFactory, data: &[u8],
) -> CryptResult<Box<dyn KeyContext>> {
    debug_assert!(data.len() >= MIN_KEYSIZE && data.len() <= MAX_PKCSIZE);

    /* Get the session-key algorithm.  Checking the identifier is delayed
       until after the checksum so that the distinct unknown-algorithm
       error can't be provoked by scrambled decrypted data */
    let algo = PgpCipherAlgo::from_id(data[0]);

    /* Checksum the session key, skipping the algorithm identifier */
    if !pgp_verify_checksum(&data[1..]) {
        return Err(CryptError::BadData);
    }
    let algo = algo.ok_or(CryptError::NotAvail)?;

    /* Create the CFB-mode context ready to have the key loaded into it */
    factory.create_cipher(algo)
}

/****************************************************************************
*                                                                           *
*                     Low-level Data Wrap/Unwrap Routines                   *
*                                                                           *
****************************************************************************/

/// Run the raw public-key transform over a formatted block, verify that
/// it actually changed the data, and strip any leading zero bytes the
/// transform produced.  Returns the final wrapped length.
fn pkc_wrap_data(
    wrap_context: &mut dyn PkcContext, data: &mut [u8],
) -> CryptResult<usize> {
    debug_assert!(data.len() >= MIN_PKCSIZE && data.len() <= MAX_PKCSIZE);
    debug_assert!(data[0] == 0x00);

    /* Take a sample of the input for comparison with the output */
    let sample_pos = data.len() / 2;
    let mut sample = Zeroizing::new([0u8; 16]);
    sample.copy_from_slice(&data[sample_pos..sample_pos + 16]);

    if let Err(err) = wrap_context.encrypt(data) {
        data.fill(0);
        return Err(err);
    }
    if bool::from(sample.ct_eq(&data[sample_pos..sample_pos + 16])) {
        /* The data to wrap is unchanged, there's been a catastrophic
           failure of the encryption */
        data.fill(0);
        return Err(CryptError::Failed);
    }

    /* The transform takes and produces fixed-length values but some of
       the output can be leading-zero padding; strip it if present */
    let mut stripped = 0;
    while stripped < data.len() - 16 && data[stripped] == 0 {
        stripped += 1;
    }
    let length = data.len() - stripped;
    data.copy_within(stripped.., 0);
    data[length..].fill(0);
    Ok(length)
}

/// Format-adjust a wrapped value to the modulus length and run the raw
/// private-key transform over it.
fn pkc_unwrap_data(
    wrap_context: &mut dyn PkcContext, data: &mut [u8; MAX_PKCSIZE], wrapped: &[u8],
    key_size: usize,
) -> CryptResult<()> {
    let result = adjust_pkcs1_data(&mut data[..], wrapped, key_size)
        .and_then(|()| wrap_context.decrypt(&mut data[..key_size]));
    if result.is_err() {
        data.fill(0);
    }
    result
}

/****************************************************************************
*                                                                           *
*                       PKCS #1 Wrap/Unwrap Mechanisms                      *
*                                                                           *
****************************************************************************/

/// Generate a PKCS #1 block `[ 0 ][ 2 ][ nonzero random ][ 0 ]` leaving
/// room for a `message_len`-byte payload at the end.  Returns the
/// padding size (payload offset).
fn generate_pkcs1_data_block(
    rng: &mut impl CryptoRngCore, data: &mut [u8], message_len: usize,
) -> CryptResult<usize> {
    debug_assert!(data.len() >= MIN_PKCSIZE);
    ensure!(message_len >= MIN_KEYSIZE, CryptError::BadData);

    /* PKCS #1 requires at least 8 bytes of random padding, so the payload
       must leave 11 bytes over */
    if message_len + 11 > data.len() {
        return Err(CryptError::Overflow);
    }
    let pkcs1_pad_size = data.len() - (message_len + 3);

    /* Encode the payload using the PKCS #1 format:

        [ 0 ][ 2 ][ nonzero random padding ][ 0 ][ payload ]

       The random padding is a nice place for a subliminal channel,
       especially with the larger key sizes where the padding can carry
       more information than the payload */
    data[0] = 0;
    data[1] = 2;
    if let Err(err) = random_nonzero(rng, &mut data[2..2 + pkcs1_pad_size]) {
        data.fill(0);
        return Err(err);
    }
    data[2 + pkcs1_pad_size] = 0;
    Ok(2 + pkcs1_pad_size + 1)
}

/// Validate the PKCS #1 padding of a recovered block and return the
/// payload offset.
///
/// All of the format checks are bundled into this one spot and kept as
/// simple and quick as possible; timing measurements of the protocols
/// that could use this as an oracle (TLS, some PKI protocols) show no
/// usable signal from the minute differences at this level.
fn recover_pkcs1_data_block(data: &[u8]) -> CryptResult<usize> {
    debug_assert!(data.len() >= MIN_PKCSIZE && data.len() <= MAX_PKCSIZE);

    /* PKCS #1 needs at least 11 (2 + 8 + 1) bytes of padding on top of
       the minimum payload */
    if data.len() < 11 + MIN_KEYSIZE {
        return Err(CryptError::BadData);
    }
    if data[0] != 0x00 || data[1] != 0x02 {
        return Err(CryptError::BadData);
    }

    /* Find the zero byte separating padding from payload */
    let mut ch0_pos = 0usize;
    for (index, &ch) in data.iter().enumerate().skip(1) {
        if (ch0_pos | usize::from(ch)) == 0 {
            ch0_pos = index; /* Set on first zero byte */
        }
    }

    /* The payload can never come close to MIN_PKCSIZE in size, so the
       separator must sit at least MIN_PKCSIZE - ( MAX_PAYLOAD_SIZE + 8 )
       bytes in, and at least MIN_KEYSIZE payload bytes must follow it */
    if ch0_pos < MIN_PKCSIZE - (MAX_PAYLOAD_SIZE + 8) {
        return Err(CryptError::BadData);
    }
    if data.len() - (ch0_pos + 1) < MIN_KEYSIZE {
        return Err(CryptError::BadData);
    }

    Ok(ch0_pos + 1) /* Skip the final 0x00 */
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pkcs1WrapType {
    Normal,
    Raw,
    Pgp,
}

fn pkcs1_wrap(
    rng: &mut impl CryptoRngCore, info: &mut MechanismPkcWrapInfo<'_>,
    wrap_type: Pkcs1WrapType,
) -> CryptResult<()> {
    /* Get various algorithm parameters */
    let length = info.wrap_context.key_size();
    ensure!(length >= MIN_PKCSIZE, CryptError::NoSecure);
    ensure!(length <= MAX_PKCSIZE, CryptError::Overflow);

    /* If this is just a length check, we're done */
    let Some(wrapped_data) = info.wrapped_data.as_deref_mut() else {
        info.wrapped_data_length = length;
        return Ok(());
    };

    /* Make sure that there's enough room for the wrapped key data */
    if length > wrapped_data.len() {
        return Err(CryptError::Overflow);
    }
    let wrapped_data = &mut wrapped_data[..length];
    wrapped_data.fill(0);

    /* Get the payload details, either from data passed in by the caller
       or from the key context */
    let (payload_size, pgp_algo_id) = match (&info.payload, wrap_type) {
        (WrapPayload::Raw(data), Pkcs1WrapType::Raw) => (data.len(), 0),
        (WrapPayload::Key(key_context), Pkcs1WrapType::Normal | Pkcs1WrapType::Raw) => {
            (key_context.key_size(), 0)
        }
        (WrapPayload::Key(key_context), Pkcs1WrapType::Pgp) => {
            /* PGP includes an additional algorithm identifier and
               checksum with the wrapped key */
            (key_context.key_size() + 3, key_context.pgp_algo()?.id())
        }
        (WrapPayload::Raw(_), Pkcs1WrapType::Pgp) => return Err(CryptError::BadData),
        (WrapPayload::Raw(_), Pkcs1WrapType::Normal) => unreachable!(),
    };

    /* A preliminary check for an excessively long payload, made precise
       inside generate_pkcs1_data_block() */
    if payload_size >= length {
        return Err(CryptError::Overflow);
    }

    /* Generate the PKCS #1 block with room for the payload at the end,
       then copy the payload in at the last possible moment */
    let result = (|| {
        let pkcs1_pad_size = generate_pkcs1_data_block(rng, wrapped_data, payload_size)?;
        debug_assert!(pkcs1_pad_size + payload_size == length);

        let payload = &mut wrapped_data[pkcs1_pad_size..];
        match (&info.payload, wrap_type) {
            (WrapPayload::Key(key_context), Pkcs1WrapType::Normal | Pkcs1WrapType::Raw) => {
                let extracted = key_context.extract_key(payload)?;
                ensure!(extracted == payload_size, CryptError::Failed);
            }
            (WrapPayload::Raw(data), Pkcs1WrapType::Raw) => {
                payload.copy_from_slice(data);
            }
            (WrapPayload::Key(key_context), Pkcs1WrapType::Pgp) => {
                payload[0] = pgp_algo_id;
                let extracted = key_context.extract_key(&mut payload[1..])?;
                ensure!(extracted == payload_size - 3, CryptError::Failed);
                pgp_generate_checksum(&mut payload[1..], payload_size - 3);
            }
            (WrapPayload::Raw(_), Pkcs1WrapType::Pgp) => unreachable!(),
            (WrapPayload::Raw(_), Pkcs1WrapType::Normal) => unreachable!(),
        }

        /* Wrap the encoded block using the public key */
        pkc_wrap_data(info.wrap_context, wrapped_data)
    })();
    match result {
        Ok(wrapped_length) => {
            info.wrapped_data_length = wrapped_length;
            Ok(())
        }
        Err(err) => {
            wrapped_data.fill(0);
            Err(err)
        }
    }
}

fn pkcs1_unwrap(
    info: &mut MechanismPkcUnwrapInfo<'_>, wrap_type: Pkcs1WrapType,
) -> CryptResult<()> {
    /* Get various algorithm parameters */
    let key_size = info.wrap_context.key_size();
    ensure!(key_size >= MIN_PKCSIZE, CryptError::NoSecure);
    ensure!(key_size <= MAX_PKCSIZE, CryptError::Overflow);

    let max_payload_length = match (&info.target, wrap_type) {
        (UnwrapTarget::Raw(data), Pkcs1WrapType::Raw) => data.len(),
        (_, Pkcs1WrapType::Pgp) => MAX_WORKING_KEYSIZE + 3,
        _ => MAX_WORKING_KEYSIZE,
    };

    /* Decrypt the data.  If the raw transform fails, continue over dummy
       PKCS #1-shaped data: there's no obvious way to make the transform
       itself fail by manipulating the input (the padding check further
       down is what catches garbage), but a failure mid-transform would
       otherwise hand an attacker a clean timing signal, and the defence
       costs nothing */
    let mut decrypted = Zeroizing::new([0u8; MAX_PKCSIZE]);
    let unwrap_status =
        pkc_unwrap_data(info.wrap_context, &mut decrypted, info.wrapped_data, key_size);
    let (block, unwrap_error): (&[u8], _) = match unwrap_status {
        Ok(()) => (&decrypted[..key_size], None),
        Err(err) => (&FIXED_FORMATTED_VALUE[..key_size], Some(err)),
    };

    /* Recover the PKCS #1 block, with the payload at the end.  An error
       from the decrypt stage is reported in preference to the generic
       bad-data that the dummy block produces here */
    let pkcs1_pad_size = match recover_pkcs1_data_block(block) {
        Ok(size) => size,
        Err(err) => return Err(unwrap_error.unwrap_or(err)),
    };
    if let Some(err) = unwrap_error {
        return Err(err);
    }

    /* Evaluate the location and length of the payload and make sure that
       it can plausibly hold a key */
    let length = key_size - pkcs1_pad_size;
    if !(MIN_KEYSIZE..=max_payload_length).contains(&length) {
        return Err(CryptError::BadData);
    }
    let payload = &decrypted[pkcs1_pad_size..key_size];

    /* Return the result to the caller or load it into a context as a
       key */
    match (&mut info.target, wrap_type) {
        (UnwrapTarget::Key(key_context), Pkcs1WrapType::Normal | Pkcs1WrapType::Raw) => {
            key_context.load_key(payload).map_err(|err| match err {
                /* An error with the key value or size means the payload
                   wasn't a key */
                CryptError::Overflow | CryptError::Underflow => CryptError::BadData,
                other => other,
            })
        }
        (UnwrapTarget::Raw(data), Pkcs1WrapType::Normal | Pkcs1WrapType::Raw) => {
            /* This path carries the TLS premaster secret, so the
               recovered length has to match the expected length exactly */
            if length != data.len() {
                return Err(CryptError::Overflow);
            }
            data.copy_from_slice(payload);
            Ok(())
        }
        (UnwrapTarget::PgpCreate { factory, context }, Pkcs1WrapType::Pgp) => {
            /* PGP wraps extra data around the key, which has to be
               processed before the key can be loaded */
            let mut created = pgp_extract_key(&mut **factory, payload)?;
            let key = &payload[1..length - 2];
            if key.len() < MIN_KEYSIZE {
                return Err(CryptError::BadData);
            }
            created.load_key(key).map_err(|err| match err {
                CryptError::Overflow | CryptError::Underflow => CryptError::BadData,
                other => other,
            })?;
            **context = Some(created);
            Ok(())
        }
        _ => Err(CryptError::BadData),
    }
}

/// Wrap a session key (or raw TLS premaster payload) with PKCS #1 v1.5.
pub fn export_pkcs1(
    rng: &mut impl CryptoRngCore, info: &mut MechanismPkcWrapInfo<'_>,
) -> CryptResult<()> {
    let wrap_type = match info.payload {
        WrapPayload::Raw(_) => Pkcs1WrapType::Raw,
        WrapPayload::Key(_) => Pkcs1WrapType::Normal,
    };
    pkcs1_wrap(rng, info, wrap_type)
}

/// Unwrap a PKCS #1 v1.5 wrapped key.
pub fn import_pkcs1(info: &mut MechanismPkcUnwrapInfo<'_>) -> CryptResult<()> {
    let wrap_type = match info.target {
        UnwrapTarget::Raw(_) => Pkcs1WrapType::Raw,
        _ => Pkcs1WrapType::Normal,
    };
    pkcs1_unwrap(info, wrap_type)
}

/// Wrap a session key in the PGP flavour of PKCS #1 (algorithm id and
/// MPI checksum inside the payload).
pub fn export_pkcs1_pgp(
    rng: &mut impl CryptoRngCore, info: &mut MechanismPkcWrapInfo<'_>,
) -> CryptResult<()> {
    pkcs1_wrap(rng, info, Pkcs1WrapType::Pgp)
}

/// Unwrap a PGP PKCS #1 wrapped session key, creating the context named
/// by the algorithm identifier inside the payload.
pub fn import_pkcs1_pgp(info: &mut MechanismPkcUnwrapInfo<'_>) -> CryptResult<()> {
    pkcs1_unwrap(info, Pkcs1WrapType::Pgp)
}

/****************************************************************************
*                                                                           *
*                       OAEP Key Wrap/Unwrap Mechanisms                     *
*                                                                           *
****************************************************************************/

/* The lHash value is the hash of a label that's never used, so what's
   hashed is always the empty string and the result is a per-algorithm
   constant */

const LHASH_SHA1: &[u8] = &[
    0xDA, 0x39, 0xA3, 0xEE, 0x5E, 0x6B, 0x4B, 0x0D, 0x32, 0x55, 0xBF, 0xEF, 0x95, 0x60,
    0x18, 0x90, 0xAF, 0xD8, 0x07, 0x09,
];
const LHASH_SHA256: &[u8] = &[
    0xE3, 0xB0, 0xC4, 0x42, 0x98, 0xFC, 0x1C, 0x14, 0x9A, 0xFB, 0xF4, 0xC8, 0x99, 0x6F,
    0xB9, 0x24, 0x27, 0xAE, 0x41, 0xE4, 0x64, 0x9B, 0x93, 0x4C, 0xA4, 0x95, 0x99, 0x1B,
    0x78, 0x52, 0xB8, 0x55,
];
const LHASH_SHA384: &[u8] = &[
    0x38, 0xB0, 0x60, 0xA7, 0x51, 0xAC, 0x96, 0x38, 0x4C, 0xD9, 0x32, 0x7E, 0xB1, 0xB1,
    0xE3, 0x6A, 0x21, 0xFD, 0xB7, 0x11, 0x14, 0xBE, 0x07, 0x43, 0x4C, 0x0C, 0xC7, 0xBF,
    0x63, 0xF6, 0xE1, 0xDA, 0x27, 0x4E, 0xDE, 0xBF, 0xE7, 0x6F, 0x65, 0xFB, 0xD5, 0x1A,
    0xD2, 0xF1, 0x48, 0x98, 0xB9, 0x5B,
];
const LHASH_SHA512: &[u8] = &[
    0xCF, 0x83, 0xE1, 0x35, 0x7E, 0xEF, 0xB8, 0xBD, 0xF1, 0x54, 0x28, 0x50, 0xD6, 0x6D,
    0x80, 0x07, 0xD6, 0x20, 0xE4, 0x05, 0x0B, 0x57, 0x15, 0xDC, 0x83, 0xF4, 0xA9, 0x21,
    0xD3, 0x6C, 0xE9, 0xCE, 0x47, 0xD0, 0xD1, 0x3C, 0x5D, 0x85, 0xF2, 0xB0, 0xFF, 0x83,
    0x18, 0xD2, 0x87, 0x7E, 0xEC, 0x2F, 0x63, 0xB9, 0x31, 0xBD, 0x47, 0x41, 0x7A, 0x81,
    0xA5, 0x38, 0x32, 0x7A, 0xF9, 0x27, 0xDA, 0x3E,
];

fn get_oaep_lhash(hash_algo: HashAlgo) -> CryptResult<&'static [u8]> {
    match hash_algo {
        HashAlgo::Sha1 => Ok(LHASH_SHA1),
        HashAlgo::Sha256 => Ok(LHASH_SHA256),
        HashAlgo::Sha384 => Ok(LHASH_SHA384),
        HashAlgo::Sha512 => Ok(LHASH_SHA512),
        HashAlgo::Md5 => Err(CryptError::NotAvail),
    }
}

/// MGF1 (RFC 8017): `mask = H( seed || 0 ) || H( seed || 1 ) || ...`
fn mgf1(mask: &mut [u8], seed: &[u8], hash_algo: HashAlgo) {
    debug_assert!(!mask.is_empty() && mask.len() <= MAX_PKCSIZE);
    debug_assert!(seed.len() >= 20 && seed.len() <= MAX_PKCSIZE);

    let hash_size = hash_algo.size();
    let mut mask_buffer = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let mut block_count = 0u32;
    for chunk in mask.chunks_mut(hash_size) {
        let mut hash = HashState::new(hash_algo);
        hash.update(seed);
        hash.update(&block_count.to_be_bytes());
        hash.finalize_into(&mut mask_buffer[..]);
        chunk.copy_from_slice(&mask_buffer[..chunk.len()]);
        block_count += 1;
    }
}

/// Generate an OAEP data block:
///
/// ```text
///                          +----------+---------+-------+
///                     DB = |  lHash   |    PS   |   M   |
///                          +----------+---------+-------+
///                                         |
///               +----------+              V
///               |   seed   |--> MGF ---> xor
///               +----------+              |
///                     |                   |
///            +--+     V                   |
///            |00|    xor <----- MGF <-----|
///            +--+     |                   |
///              |      |                   |
///              V      V                   V
///            +--+----------+----------------------------+
///      EM =  |00|maskedSeed|          maskedDB          |
///            +--+----------+----------------------------+
/// ```
fn generate_oaep_data_block(
    data: &mut [u8], message: &[u8], seed: &[u8], hash_algo: HashAlgo,
) -> CryptResult<()> {
    let seed_len = get_oaep_lhash(hash_algo)?.len();
    debug_assert!(seed.len() == seed_len);
    debug_assert!(data.len() >= MIN_PKCSIZE && data.len() <= MAX_PKCSIZE);
    ensure!((MIN_KEYSIZE..=MAX_KEYSIZE).contains(&message.len()), CryptError::BadData);

    /* Make sure that the payload fits:

        <------------ dataMaxLen ----------->
        +--+------+-------+----+--+---------+
        |00| seed | lhash | PS |01| message |
        +--+------+-------+----+--+---------+
          1  sLen    sLen   1   1    msgLen

       PS may be empty in the standard but at least one padding byte is
       required here.  The only case that can actually fail is SHA2-512
       with a 1024-bit key */
    if 1 + seed_len + seed_len + 1 + 1 + message.len() > data.len() {
        return Err(CryptError::Overflow);
    }

    let db_len = data.len() - (1 + seed_len);

    /* db = lHash || zeroes || 0x01 || message */
    {
        let db = &mut data[1 + seed_len..];
        db.fill(0);
        db[..seed_len].copy_from_slice(get_oaep_lhash(hash_algo)?);
        db[db_len - message.len() - 1] = 0x01;
        db[db_len - message.len()..].copy_from_slice(message);
    }

    /* maskedDB = db ^ MGF1( seed, dbLen ) */
    let mut db_mask = Zeroizing::new([0u8; MAX_PKCSIZE]);
    mgf1(&mut db_mask[..db_len], seed, hash_algo);
    for (db_byte, mask_byte) in data[1 + seed_len..].iter_mut().zip(db_mask.iter()) {
        *db_byte ^= mask_byte;
    }

    /* maskedSeed = seed ^ MGF1( maskedDB, seedLen ) */
    let mut seed_mask = Zeroizing::new([0u8; MAX_HASHSIZE]);
    mgf1(&mut seed_mask[..seed_len], &data[1 + seed_len..], hash_algo);
    for index in 0..seed_len {
        data[1 + index] = seed[index] ^ seed_mask[index];
    }

    /* data = 0x00 || maskedSeed || maskedDB */
    data[0] = 0x00;

    Ok(())
}

/// Recover the message from an OAEP data block.
///
/// The MGF1 computations run before any byte of the block is examined and
/// the three failure conditions (leading byte, lHash mismatch, malformed
/// DB) meet at a single late reject point, defusing Manger's attack.
fn recover_oaep_data_block(
    message: &mut [u8], data: &[u8], hash_algo: HashAlgo,
) -> CryptResult<usize> {
    debug_assert!(data.len() >= MIN_PKCSIZE && data.len() <= MAX_PKCSIZE);

    let lhash = get_oaep_lhash(hash_algo)?;
    let seed_len = lhash.len();

    /* Take a local copy of the input, since it's about to be operated
       on */
    let mut data_buffer = Zeroizing::new([0u8; MAX_PKCSIZE]);
    data_buffer[..data.len()].copy_from_slice(data);
    let data_len = data.len();
    let db_len = data_len - (1 + seed_len);

    /* The hash has to fit the modulus at all; this depends only on the
       public parameter choice, never on the data, so checking it before
       the unmasking leaks nothing */
    if db_len <= seed_len {
        return Err(CryptError::BadData);
    }

    /* seed = maskedSeed ^ MGF1( maskedDB, seedLen ) */
    let mut seed_mask = Zeroizing::new([0u8; MAX_HASHSIZE]);
    mgf1(&mut seed_mask[..seed_len], &data_buffer[1 + seed_len..data_len], hash_algo);
    for index in 0..seed_len {
        data_buffer[1 + index] ^= seed_mask[index];
    }

    /* db = maskedDB ^ MGF1( seed, dbLen ) */
    let mut db_mask = Zeroizing::new([0u8; MAX_PKCSIZE]);
    {
        let (seed_part, db_part) = data_buffer.split_at_mut(1 + seed_len);
        mgf1(&mut db_mask[..db_len], &seed_part[1..], hash_algo);
        for (db_byte, mask_byte) in db_part[..db_len].iter_mut().zip(db_mask.iter()) {
            *db_byte ^= mask_byte;
        }
    }
    let db = &data_buffer[1 + seed_len..data_len];

    /* Verify that:

        data = 0x00 || [seed] || lHash || zeroes || 0x01 || message

       The ordering matters: checking the leading 0x00 before the OAEP
       processing would allow the timing attack of "A chosen ciphertext
       attack on RSA optimal asymmetric encryption padding (OAEP)"
       (Manger, Crypto'01), so all of the format checks cluster here
       after the unmasking and feed one accept/reject decision */
    let mut failed = Choice::from(u8::from(1 + seed_len + seed_len + 1 + 1 + MIN_KEYSIZE
                                           > data_len));
    failed |= Choice::from(u8::from(data_buffer[0] != 0x00));
    failed |= !db[..seed_len].ct_eq(lhash);
    let mut index = seed_len;
    while index < db_len && db[index] == 0x00 {
        index += 1;
    }
    failed |= Choice::from(u8::from(index <= seed_len));
    failed |= Choice::from(u8::from(index >= db_len || db[index] != 0x01));
    if bool::from(failed) {
        return Err(CryptError::BadData);
    }
    index += 1; /* Skip the 0x01 */

    let length = db_len - index;
    if length < MIN_KEYSIZE {
        return Err(CryptError::Underflow);
    }
    if length > message.len() {
        return Err(CryptError::Overflow);
    }

    /* Return the recovered message to the caller */
    message[..length].copy_from_slice(&db[index..index + length]);
    Ok(length)
}

/// Wrap a session key with RSA-OAEP; the MGF hash is selected by the
/// descriptor's `aux_hash`.
pub fn export_oaep(
    rng: &mut impl CryptoRngCore, info: &mut MechanismPkcWrapInfo<'_>,
) -> CryptResult<()> {
    /* Make sure that the OAEP auxiliary algorithm requirements are met */
    let seed_len = get_oaep_lhash(info.aux_hash)?.len();

    /* Get various algorithm parameters */
    let length = info.wrap_context.key_size();
    ensure!(length >= MIN_PKCSIZE, CryptError::NoSecure);
    ensure!(length <= MAX_PKCSIZE, CryptError::Overflow);

    /* If this is just a length check, we're done */
    let Some(wrapped_data) = info.wrapped_data.as_deref_mut() else {
        info.wrapped_data_length = length;
        return Ok(());
    };
    if length > wrapped_data.len() {
        return Err(CryptError::Overflow);
    }
    let wrapped_data = &mut wrapped_data[..length];
    wrapped_data.fill(0);

    let WrapPayload::Key(key_context) = &info.payload else {
        return Err(CryptError::BadData);
    };
    let payload_size = key_context.key_size();

    /* Generate the OAEP random seed value and extract the key data into
       an OAEP data block */
    let mut seed = Zeroizing::new([0u8; MAX_HASHSIZE]);
    random_bytes(rng, &mut seed[..seed_len])?;
    let mut payload = Zeroizing::new([0u8; MAX_KEYSIZE]);
    let result = (|| {
        let extracted = key_context.extract_key(&mut payload[..])?;
        ensure!(extracted == payload_size, CryptError::Failed);
        generate_oaep_data_block(wrapped_data, &payload[..payload_size],
                                 &seed[..seed_len], info.aux_hash)?;

        /* Wrap the encoded block using the public key */
        pkc_wrap_data(info.wrap_context, wrapped_data)
    })();
    match result {
        Ok(wrapped_length) => {
            info.wrapped_data_length = wrapped_length;
            Ok(())
        }
        Err(err) => {
            wrapped_data.fill(0);
            Err(err)
        }
    }
}

/// Unwrap an RSA-OAEP wrapped session key.
pub fn import_oaep(info: &mut MechanismPkcUnwrapInfo<'_>) -> CryptResult<()> {
    /* Check the MGF requirements before the decrypt: bailing out right
       after the decrypt on a bad hash parameter would provide a rather
       precise decryption timer */
    let _seed_len = get_oaep_lhash(info.aux_hash)?.len();

    /* Get various algorithm parameters */
    let key_size = info.wrap_context.key_size();
    ensure!(key_size >= MIN_PKCSIZE, CryptError::NoSecure);
    ensure!(key_size <= MAX_PKCSIZE, CryptError::Overflow);

    /* Decrypt the data, continuing over the dummy block on failure as in
       the PKCS #1 unwrap */
    let mut decrypted = Zeroizing::new([0u8; MAX_PKCSIZE]);
    let unwrap_status =
        pkc_unwrap_data(info.wrap_context, &mut decrypted, info.wrapped_data, key_size);
    let (block, unwrap_error): (&[u8], _) = match unwrap_status {
        Ok(()) => (&decrypted[..key_size], None),
        Err(err) => (&FIXED_FORMATTED_VALUE[..key_size], Some(err)),
    };

    /* Recover the payload from the OAEP data block, reporting a decrypt
       error in preference to the dummy block's format error */
    let mut message = Zeroizing::new([0u8; MAX_PKCSIZE]);
    let message_len = match recover_oaep_data_block(&mut message[..], block, info.aux_hash)
    {
        Ok(length) => length,
        Err(err) => return Err(unwrap_error.unwrap_or(err)),
    };
    if let Some(err) = unwrap_error {
        return Err(err);
    }

    /* Load the decrypted keying information into the session-key
       context */
    let UnwrapTarget::Key(key_context) = &mut info.target else {
        return Err(CryptError::BadData);
    };
    key_context.load_key(&message[..message_len]).map_err(|err| match err {
        CryptError::Overflow | CryptError::Underflow => CryptError::BadData,
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn pkcs1_block_round_trip() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(123);
        let mut buffer = [0u8; 256];
        let pad_size = generate_pkcs1_data_block(&mut rng, &mut buffer, 16).unwrap();
        assert_eq!(pad_size + 16, 256);
        buffer[pad_size..].fill(b'*');

        let recovered_pad = recover_pkcs1_data_block(&buffer).unwrap();
        assert_eq!(recovered_pad, pad_size);
        assert!(buffer[recovered_pad..].iter().all(|&b| b == b'*'));
    }

    #[test]
    fn pkcs1_block_corruption() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(456);
        // Corrupt the leading zero and the block type
        for corrupt in [0usize, 1] {
            let mut buffer = [0u8; 256];
            generate_pkcs1_data_block(&mut rng, &mut buffer, 16).unwrap();
            buffer[corrupt] = buffer[corrupt].wrapping_add(1);
            assert_eq!(recover_pkcs1_data_block(&buffer), Err(CryptError::BadData));
        }

        // Zero a padding byte, truncating the padding run
        let mut buffer = [0u8; 256];
        generate_pkcs1_data_block(&mut rng, &mut buffer, 16).unwrap();
        buffer[30] = 0;
        assert_eq!(recover_pkcs1_data_block(&buffer), Err(CryptError::BadData));

        // Corrupt the trailing zero separator
        let mut buffer = [0u8; 256];
        let pad_size = generate_pkcs1_data_block(&mut rng, &mut buffer, 16).unwrap();
        buffer[pad_size - 1] = buffer[pad_size - 1].wrapping_add(1);
        assert_eq!(recover_pkcs1_data_block(&buffer), Err(CryptError::BadData));
    }

    #[test]
    fn oaep_block_round_trip() {
        let seed = [
            0xAA, 0xFD, 0x12, 0xF6, 0x59, 0xCA, 0xE6, 0x34, 0x89, 0xB4, 0x79, 0xE5, 0x07,
            0x6D, 0xDE, 0xC2, 0xF0, 0x6C, 0xB5, 0x8F,
        ];
        let message = [
            0xD4, 0x36, 0xE9, 0x95, 0x69, 0xFD, 0x32, 0xA7, 0xC8, 0xA0, 0x5B, 0xBC, 0x90,
            0xD3, 0x2C, 0x49,
        ];
        let mut buffer = [0u8; 256];
        generate_oaep_data_block(&mut buffer, &message, &seed, HashAlgo::Sha1).unwrap();
        let mut out = [0u8; 128];
        let out_len = recover_oaep_data_block(&mut out, &buffer, HashAlgo::Sha1).unwrap();
        assert_eq!(&out[..out_len], &message);

        // SHA-256 MGF
        let mut seed256 = [0u8; 32];
        seed256[..20].copy_from_slice(&seed);
        let mut buffer = [0u8; 256];
        generate_oaep_data_block(&mut buffer, &message, &seed256, HashAlgo::Sha256)
            .unwrap();
        let mut out = [0u8; 128];
        let out_len =
            recover_oaep_data_block(&mut out, &buffer, HashAlgo::Sha256).unwrap();
        assert_eq!(&out[..out_len], &message);
    }

    #[test]
    fn oaep_block_corruption() {
        let seed = [0x5Au8; 20];
        let message = [0xC3u8; 16];
        for corrupt in [0usize, 40, 255] {
            let mut buffer = [0u8; 256];
            generate_oaep_data_block(&mut buffer, &message, &seed, HashAlgo::Sha1)
                .unwrap();
            buffer[corrupt] = buffer[corrupt].wrapping_add(1);
            let mut out = [0u8; 128];
            assert_eq!(recover_oaep_data_block(&mut out, &buffer, HashAlgo::Sha1),
                       Err(CryptError::BadData), "corrupt {corrupt}");
        }
    }

    #[test]
    fn oaep_payload_too_large_for_small_key() {
        // SHA-512 MGF with a 1024-bit key can't fit a payload
        let seed = [0u8; 64];
        let message = [0u8; 32];
        let mut buffer = [0u8; 128];
        assert_eq!(
            generate_oaep_data_block(&mut buffer, &message, &seed, HashAlgo::Sha512),
            Err(CryptError::Overflow)
        );
    }

    #[test]
    fn pgp_checksum_detects_change() {
        let mut data = [0u8; 18];
        data[..16].copy_from_slice(&[0x42; 16]);
        pgp_generate_checksum(&mut data, 16);
        assert!(pgp_verify_checksum(&data));
        data[3] ^= 0x01;
        assert!(!pgp_verify_checksum(&data));
    }

    #[test]
    fn dummy_block_fails_padding_check() {
        // The fixed formatted value must pass the header check but fail
        // the full padding recovery, so that the post-decrypt code path
        // runs on it without accepting it
        assert_eq!(FIXED_FORMATTED_VALUE[0], 0x00);
        assert_eq!(FIXED_FORMATTED_VALUE[1], 0x02);
        assert!(recover_pkcs1_data_block(&FIXED_FORMATTED_VALUE[..256]).is_err());
    }
}
