//! CMS conventional (symmetric) key wrap.
//!
//! The RFC 3217-style "triple wrap": the key block is CBC-encrypted
//! twice, the second pass reusing the chaining state left by the first,
//! so that every output block depends on every input block in both
//! directions and no integrity tag is needed beyond a 4-byte header of
//! length and check bytes.  A check failure on unwrap means the wrong
//! KEK far more often than corrupted data and is reported as such.

use crate::kernel::random_bytes;
use crate::mech::{MechanismCmsUnwrapInfo, MechanismCmsWrapInfo};
use crate::{
    ensure, CryptError, CryptResult, MAX_IVSIZE, MAX_KEYSIZE, MAX_WORKING_KEYSIZE,
    MIN_KEYSIZE,
};
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/* The key block header: an 8-bit length followed by a 24-bit check value */

const CMS_KEYBLOCK_HEADERSIZE: usize = 4;

/// Padding needed to bring the payload up to a block-size multiple of at
/// least two blocks.  Unlike PKCS #5 padding the total may be zero.
fn get_pad_size(block_size: usize, payload_size: usize) -> usize {
    debug_assert!(block_size.is_power_of_two());
    let mut total_size = (payload_size + block_size - 1) & !(block_size - 1);
    if total_size < block_size * 2 {
        total_size = block_size * 2;
    }
    total_size - payload_size
}

/// Wrap a session key with a KEK:
///
/// ```text
/// |<-- HDRSIZE + keySize -->|<- padSize ->|
/// +--------+--------+-------+-------------+
/// | length | check  |  key  |   padding   |
/// +--------+--------+-------+-------------+
/// |<- 1 ->|<-- 3 -->|
/// ```
///
/// followed by two passes of CBC encryption, the second pass retaining
/// the IV left by the first.
pub fn export_cms(
    rng: &mut impl CryptoRngCore, info: &mut MechanismCmsWrapInfo<'_>,
) -> CryptResult<()> {
    /* Get the key payload details from the key contexts */
    let key_size = info.key_context.key_size();
    ensure!((MIN_KEYSIZE..=MAX_KEYSIZE).contains(&key_size), CryptError::BadData);
    let block_size = info.wrap_context.block_size();
    ensure!(block_size >= 8 && block_size <= MAX_IVSIZE, CryptError::BadData);
    let pad_size = get_pad_size(block_size, CMS_KEYBLOCK_HEADERSIZE + key_size);
    let total_size = CMS_KEYBLOCK_HEADERSIZE + key_size + pad_size;

    /* If this is just a length check, we're done */
    let Some(wrapped_data) = info.wrapped_data.as_deref_mut() else {
        info.wrapped_data_length = total_size;
        return Ok(());
    };

    /* Make sure that the wrapped key data fits in the output */
    if total_size > wrapped_data.len() {
        return Err(CryptError::Overflow);
    }
    let key_block = &mut wrapped_data[..total_size];
    key_block.fill(0);

    let result = (|| {
        /* Pad the payload out with a random nonce if required */
        if pad_size > 0 {
            random_bytes(rng, &mut key_block[CMS_KEYBLOCK_HEADERSIZE + key_size..])?;
        }

        /* Format the key block, copying the payload in at the last
           possible moment, then perform the two encryption passes */
        key_block[0] = key_size as u8;
        let extracted =
            info.key_context.extract_key(&mut key_block[CMS_KEYBLOCK_HEADERSIZE..
                                                        CMS_KEYBLOCK_HEADERSIZE + key_size])?;
        ensure!(extracted == key_size, CryptError::Failed);
        key_block[1] = key_block[CMS_KEYBLOCK_HEADERSIZE] ^ 0xFF;
        key_block[2] = key_block[CMS_KEYBLOCK_HEADERSIZE + 1] ^ 0xFF;
        key_block[3] = key_block[CMS_KEYBLOCK_HEADERSIZE + 2] ^ 0xFF;

        let mut data_sample = Zeroizing::new([0u8; 16]);
        data_sample.copy_from_slice(&key_block[..16]);

        info.wrap_context.encrypt(key_block)?;
        info.wrap_context.encrypt(key_block)?;

        /* If the data is unchanged there's been a catastrophic failure of
           the encryption */
        if bool::from(data_sample.ct_eq(&key_block[..16])) {
            return Err(CryptError::Failed);
        }
        Ok(())
    })();
    if let Err(err) = result {
        key_block.fill(0);
        return Err(err);
    }
    info.wrapped_data_length = total_size;

    Ok(())
}

/// Unwrap a CMS-wrapped session key and load it into the key context.
pub fn import_cms(info: &mut MechanismCmsUnwrapInfo<'_>) -> CryptResult<()> {
    /* Make sure that the data is a multiple of the cipher block size and
       contains at least two encrypted blocks */
    let block_size = info.wrap_context.block_size();
    ensure!(block_size >= 8 && block_size <= MAX_IVSIZE, CryptError::BadData);
    let data_length = info.wrapped_data.len();
    if data_length & (block_size - 1) != 0 {
        return Err(CryptError::BadData);
    }
    if data_length < 2 * block_size {
        return Err(CryptError::Underflow);
    }
    if data_length > MAX_KEYSIZE + block_size {
        return Err(CryptError::Overflow);
    }

    /* Save the current IV for the inner decryption */
    let mut iv_buffer = Zeroizing::new([0u8; MAX_IVSIZE]);
    let iv_length = info.wrap_context.get_iv(&mut iv_buffer[..])?;
    ensure!(iv_length == block_size, CryptError::Failed);

    let mut buffer = Zeroizing::new([0u8; MAX_KEYSIZE + MAX_IVSIZE]);
    buffer[..data_length].copy_from_slice(info.wrapped_data);

    let result = (|| {
        /* First pass: decrypt the n'th block using the n-1'th ciphertext
           block as its IV, then decrypt the remainder using the decrypted
           n'th block as the IV */
        let last_block = data_length - block_size;
        let second_last = data_length - 2 * block_size;
        let mut iv = Zeroizing::new([0u8; MAX_IVSIZE]);
        iv[..block_size].copy_from_slice(&buffer[second_last..last_block]);
        info.wrap_context.set_iv(&iv[..block_size])?;
        info.wrap_context.decrypt(&mut buffer[last_block..data_length])?;
        iv[..block_size].copy_from_slice(&buffer[last_block..data_length]);
        info.wrap_context.set_iv(&iv[..block_size])?;
        info.wrap_context.decrypt(&mut buffer[..last_block])?;

        /* Second pass: decrypt the whole lot using the original IV */
        info.wrap_context.set_iv(&iv_buffer[..block_size])?;
        info.wrap_context.decrypt(&mut buffer[..data_length])
    })();
    if result.is_err() {
        return result;
    }

    /* Make sure that everything is in order.  The individual conditions
       are folded into a single accumulated value so that only one
       comparison result is visible:

        buffer[0] in MIN_KEYSIZE..=MAX_WORKING_KEYSIZE,
        buffer[0] <= dataLength - HEADERSIZE,
        each check byte == payload byte ^ 0xFF

       A failure here is far more likely to mean the wrong KEK than
       corrupted data, so it's reported as a wrong-key error */
    let key_length = usize::from(buffer[0]);
    let mut bad = u8::from(key_length < MIN_KEYSIZE)
        | u8::from(key_length > MAX_WORKING_KEYSIZE)
        | u8::from(key_length > data_length - CMS_KEYBLOCK_HEADERSIZE);
    bad |= buffer[1] ^ buffer[CMS_KEYBLOCK_HEADERSIZE] ^ 0xFF;
    bad |= buffer[2] ^ buffer[CMS_KEYBLOCK_HEADERSIZE + 1] ^ 0xFF;
    bad |= buffer[3] ^ buffer[CMS_KEYBLOCK_HEADERSIZE + 2] ^ 0xFF;
    if bad != 0 {
        return Err(CryptError::WrongKey);
    }

    /* Load the recovered key into the session key context */
    info.key_context
        .load_key(&buffer[CMS_KEYBLOCK_HEADERSIZE..CMS_KEYBLOCK_HEADERSIZE + key_length])
        .map_err(|err| match err {
            /* An error with the key value or size means the payload
               wasn't usable as a key */
            CryptError::Overflow | CryptError::Underflow => CryptError::BadData,
            other => other,
        })
}
