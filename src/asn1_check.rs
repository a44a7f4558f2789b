//! Validation of complete ASN.1 encodings.
//!
//! [`check_object_encoding`] walks an in-memory object and verifies that
//! it decodes cleanly from the first byte to the last: every nested item
//! lands exactly on its parent's boundary, indefinite-length items are
//! constructed and properly EOC-terminated, and nothing is left over.
//! [`crate::asn1_read::read_raw_object_alloc`] runs this over everything
//! it returns so that objects that decode partially or carry trailing
//! garbage never reach a caller.

use crate::asn1_read::{check_eoc, read_length_relaxed, read_tag, Length, BER_CONSTRUCTED};
use crate::stream::ReadStream;
use crate::{CryptError, CryptResult};

/* PKI data doesn't nest anywhere near this deeply; anything that does is a
   resource-exhaustion attempt */
const MAX_NESTING_LEVEL: usize = 50;

fn check_item(stream: &mut ReadStream<'_>, depth: usize) -> CryptResult<()> {
    if depth > MAX_NESTING_LEVEL {
        return Err(CryptError::BadData);
    }

    let tag = read_tag(stream)?;
    let length = read_length_relaxed(stream)?;

    match length {
        Length::Indefinite => {
            /* Only a constructed object can be indefinite-length */
            if tag & BER_CONSTRUCTED == 0 {
                return Err(CryptError::BadData);
            }
            loop {
                if check_eoc(stream)? {
                    return Ok(());
                }
                check_item(stream, depth + 1)?;
            }
        }
        Length::Definite(length) => {
            if tag & BER_CONSTRUCTED == 0 {
                return stream.skip(length, length);
            }
            /* Each nested item must land exactly on the parent's
               boundary */
            let end = stream.tell() + length;
            while stream.tell() < end {
                check_item(stream, depth + 1)?;
                if stream.tell() > end {
                    return Err(CryptError::BadData);
                }
            }
            Ok(())
        }
    }
}

/// Verify that `data` is exactly one complete, well-formed BER/DER object
/// with no trailing bytes.
pub fn check_object_encoding(data: &[u8]) -> CryptResult<()> {
    let mut stream = ReadStream::new(data);
    check_item(&mut stream, 0)?;
    if stream.data_left() != 0 {
        return Err(CryptError::BadData);
    }
    Ok(())
}

/// The encoded length of the object at the start of `data`, without
/// requiring `data` to end with it.
pub fn get_object_length(data: &[u8]) -> CryptResult<usize> {
    let mut stream = ReadStream::new(data);
    check_item(&mut stream, 0)?;
    Ok(stream.tell())
}
