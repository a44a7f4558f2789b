//! Length-prefixed (non-ASN.1) read/write routines.
//!
//! TLS, SSH and OpenPGP all frame data with big-endian 16- or 32-bit
//! length prefixes rather than TLV headers.  The readers here give those
//! formats the same sanitisation guarantees as the ASN.1 codec: bounds
//! are checked before content is consumed, leading zero bytes on
//! multi-precision integers are stripped with the range check repeated
//! afterwards (resisting zero-prefix key-size inflation), and the
//! `checked` variants report a plausible-but-weak public key as
//! [`CryptError::NoSecure`] instead of bad data.

use crate::asn1_read::{MAX_STORED_TIME, MIN_STORED_TIME};
use crate::bignum::{import_bignum, is_short_pkc_key, Bignum, KeysizeCheck};
use crate::stream::{ReadStream, WriteStream};
use crate::{CryptError, CryptResult, MAX_INTLENGTH_SHORT, MAX_PKCSIZE};
use zeroize::Zeroize;

/// Size of a 16-bit length prefix.
pub const UINT16_SIZE: usize = 2;
/// Size of a 32-bit length prefix.
pub const UINT32_SIZE: usize = 4;

/// Round a bit count up to bytes.
#[must_use]
pub fn bits_to_bytes(bits: usize) -> usize {
    (bits + 7) / 8
}

/// Convert a byte count to bits.
#[must_use]
pub fn bytes_to_bits(bytes: usize) -> usize {
    bytes * 8
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LengthPrefix {
    /// Unsigned 16-bit length.
    U16,
    /// Unsigned 16-bit length, counted in bits (OpenPGP MPIs).
    U16Bits,
    /// Signed-convention 32-bit length (SSH).
    U32,
}

/// Read a 16-bit big-endian integer.
pub fn read_uint16(stream: &mut ReadStream<'_>) -> CryptResult<usize> {
    let mut buffer = [0u8; UINT16_SIZE];
    stream.read(&mut buffer)?;
    Ok(usize::from(buffer[0]) << 8 | usize::from(buffer[1]))
}

/// Read a 32-bit big-endian integer.  The formats using this treat the
/// value as signed, so the top bit must be clear.
pub fn read_uint32(stream: &mut ReadStream<'_>) -> CryptResult<usize> {
    let mut buffer = [0u8; UINT32_SIZE];
    stream.read(&mut buffer)?;
    if buffer[0] & 0x80 != 0 {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(usize::from(buffer[0]) << 24
        | usize::from(buffer[1]) << 16
        | usize::from(buffer[2]) << 8
        | usize::from(buffer[3]))
}

/// Read a 32-bit timestamp, returned as UTC seconds since the epoch;
/// values outside the plausible stored-object window are rejected.
pub fn read_uint32_time(stream: &mut ReadStream<'_>) -> CryptResult<i64> {
    let mut buffer = [0u8; UINT32_SIZE];
    stream.read(&mut buffer)?;
    if buffer[0] & 0x80 != 0 {
        return Err(stream.set_error(CryptError::BadData));
    }
    let value = i64::from(u32::from_be_bytes(buffer));
    if !(MIN_STORED_TIME..MAX_STORED_TIME).contains(&value) {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(value)
}

/* Shared body of the 32-bit-length string/object reads */

fn read_data32(
    stream: &mut ReadStream<'_>, data: &mut [u8], include_length_field: bool,
    zero_length_ok: bool,
) -> CryptResult<usize> {
    let header_size = if include_length_field { UINT32_SIZE } else { 0 };
    let length = read_uint32(stream)?;
    if length == 0 {
        /* Zero-length value */
        if !zero_length_ok {
            return Err(CryptError::BadData);
        }
        if include_length_field {
            data[..UINT32_SIZE].fill(0);
            return Ok(UINT32_SIZE);
        }
        return Ok(0);
    }
    if length >= MAX_INTLENGTH_SHORT || header_size + length > data.len() {
        return Err(stream.set_error(CryptError::BadData));
    }
    if include_length_field {
        data[..UINT32_SIZE].copy_from_slice(&(length as u32).to_be_bytes());
    }
    stream.read(&mut data[header_size..header_size + length])?;
    Ok(header_size + length)
}

/// Read a non-empty string preceded by a 32-bit length.
pub fn read_string32(stream: &mut ReadStream<'_>, string: &mut [u8]) -> CryptResult<usize> {
    read_data32(stream, string, false, false)
}

/// Read a possibly-empty string preceded by a 32-bit length.
pub fn read_string32_opt(
    stream: &mut ReadStream<'_>, string: &mut [u8],
) -> CryptResult<usize> {
    read_data32(stream, string, false, true)
}

/// Read a raw object preceded by a 32-bit length, retaining the length
/// field at the start of the returned data.
pub fn read_raw_object32(
    stream: &mut ReadStream<'_>, buffer: &mut [u8],
) -> CryptResult<usize> {
    debug_assert!(buffer.len() > UINT32_SIZE);
    read_data32(stream, buffer, true, false)
}

fn read_universal(stream: &mut ReadStream<'_>, prefix: LengthPrefix) -> CryptResult<()> {
    let length = match prefix {
        LengthPrefix::U16 => read_uint16(stream)?,
        LengthPrefix::U32 => read_uint32(stream)?,
        LengthPrefix::U16Bits => unreachable!("no skip-read for bit-counted data"),
    };
    if length == 0 {
        return Ok(()); /* Zero-length data */
    }
    if length >= MAX_INTLENGTH_SHORT {
        return Err(CryptError::BadData);
    }
    stream.skip(length, MAX_INTLENGTH_SHORT)
}

/// Skip a 16-bit-length-prefixed field.
pub fn read_universal16(stream: &mut ReadStream<'_>) -> CryptResult<()> {
    read_universal(stream, LengthPrefix::U16)
}

/// Skip a 32-bit-length-prefixed field.
pub fn read_universal32(stream: &mut ReadStream<'_>) -> CryptResult<()> {
    read_universal(stream, LengthPrefix::U32)
}

/* Large-integer read shared by the plain, checked and bignum variants */

fn read_integer(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize, prefix: LengthPrefix, check_type: KeysizeCheck,
) -> CryptResult<usize> {
    debug_assert!(min_length > 0 && min_length < max_length && max_length <= MAX_PKCSIZE);

    /* Read the length and make sure that it's within range, with a 2-byte
       allowance for extra zero padding (the exact length is checked again
       after the padding is stripped) */
    let mut length = match prefix {
        LengthPrefix::U16 => read_uint16(stream)?,
        LengthPrefix::U16Bits => bits_to_bytes(read_uint16(stream)?),
        LengthPrefix::U32 => read_uint32(stream)?,
    };
    if check_type == KeysizeCheck::Pkc && is_short_pkc_key(length) {
        /* Below the minimum allowed but still vaguely valid: report a
           too-short key rather than a bad-data error */
        return Err(CryptError::NoSecure);
    }
    if length < min_length || length > max_length + 2 {
        return Err(stream.set_error(CryptError::BadData));
    }

    /* A signed-convention value can't have the sign bit set; this differs
       from the ASN.1 code, where the incorrect setting of the sign bit is
       so common that integers are always treated as unsigned */
    if prefix == LengthPrefix::U32 && stream.peek()? & 0x80 != 0 {
        return Err(stream.set_error(CryptError::BadData));
    }

    /* Strip leading-zero padding and repeat the range checks on the
       adjusted length */
    while length > 0 && stream.peek()? == 0 {
        stream.getc()?;
        length -= 1;
    }
    if check_type == KeysizeCheck::Pkc && is_short_pkc_key(length) {
        return Err(CryptError::NoSecure);
    }
    if length < min_length || length > max_length {
        return Err(stream.set_error(CryptError::BadData));
    }

    match integer {
        Some(buffer) => stream.read(&mut buffer[..length])?,
        None => stream.skip(length, MAX_INTLENGTH_SHORT)?,
    }
    Ok(length)
}

/// Read a large integer with a 16-bit byte-count length.
pub fn read_integer16u(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_integer(stream, integer, min_length, max_length, LengthPrefix::U16,
                 KeysizeCheck::None)
}

/// Read a large integer with a 16-bit bit-count length (OpenPGP MPI).
pub fn read_integer16u_bits(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_integer(stream, integer, min_length, max_length, LengthPrefix::U16Bits,
                 KeysizeCheck::None)
}

/// Read a large integer with a 32-bit length (SSH).
pub fn read_integer32(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_integer(stream, integer, min_length, max_length, LengthPrefix::U32,
                 KeysizeCheck::None)
}

/// [`read_integer16u`] reporting a plausible-but-short key as
/// [`CryptError::NoSecure`] (TLS ServerKeyExchange values).
pub fn read_integer16u_checked(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_integer(stream, integer, min_length, max_length, LengthPrefix::U16,
                 KeysizeCheck::Pkc)
}

/// [`read_integer32`] reporting a plausible-but-short key as
/// [`CryptError::NoSecure`] (SSH key blobs).
pub fn read_integer32_checked(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_integer(stream, integer, min_length, max_length, LengthPrefix::U32,
                 KeysizeCheck::Pkc)
}

/* Bignum-combining variants: a length-prefixed read followed by a policy
   import */

fn read_bignum_integer<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>, prefix: LengthPrefix, check_type: KeysizeCheck,
) -> CryptResult<()> {
    let mut buffer = [0u8; MAX_PKCSIZE];
    let result = (|| {
        let length = read_integer(stream, Some(&mut buffer), min_length, max_length,
                                  prefix, check_type)?;
        /* The same check type is applied twice: the read merely checks
           the byte count while the import parses the value */
        import_bignum(bignum, &buffer[..length], min_length, max_length, max_range,
                      check_type)
            .map_err(|err| stream.set_error(err))
    })();
    buffer.zeroize();
    result
}

/// Read a 16-bit-length-prefixed integer into a bignum.
pub fn read_bignum_integer16u<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, max_range,
                        LengthPrefix::U16, KeysizeCheck::None)
}

/// Read an OpenPGP MPI (bit-count length) into a bignum; bounds are in
/// bits.
pub fn read_bignum_integer16u_bits<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_bits: usize, max_bits: usize,
    max_range: Option<&B>,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, bits_to_bytes(min_bits), bits_to_bytes(max_bits),
                        max_range, LengthPrefix::U16Bits, KeysizeCheck::None)
}

/// Read a 32-bit-length-prefixed integer into a bignum.
pub fn read_bignum_integer32<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, max_range,
                        LengthPrefix::U32, KeysizeCheck::None)
}

/// [`read_bignum_integer16u`] with the too-short-key policy check.
pub fn read_bignum_integer16u_checked<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, None, LengthPrefix::U16,
                        KeysizeCheck::Pkc)
}

/// [`read_bignum_integer16u_bits`] with the too-short-key policy check.
pub fn read_bignum_integer16u_bits_checked<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_bits: usize, max_bits: usize,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, bits_to_bytes(min_bits), bits_to_bytes(max_bits),
                        None, LengthPrefix::U16Bits, KeysizeCheck::Pkc)
}

/// [`read_bignum_integer32`] with the too-short-key policy check.
pub fn read_bignum_integer32_checked<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, None, LengthPrefix::U32,
                        KeysizeCheck::Pkc)
}

/****************************************************************************
*                                                                           *
*                           Data Write Routines                             *
*                                                                           *
****************************************************************************/

/// Write a 16-bit big-endian integer.
pub fn write_uint16(stream: &mut WriteStream<'_>, value: usize) -> CryptResult<()> {
    debug_assert!(value <= 0xFFFF);
    stream.write(&[(value >> 8) as u8, (value & 0xFF) as u8])
}

/// Write a 32-bit big-endian integer.
pub fn write_uint32(stream: &mut WriteStream<'_>, value: usize) -> CryptResult<()> {
    debug_assert!(value <= 0x7FFF_FFFF);
    stream.write(&(value as u32).to_be_bytes())
}

/// Write a 64-bit big-endian integer.  The value is never really 64 bits,
/// just an overprovisioned length, so the top four bytes are zero.
pub fn write_uint64(stream: &mut WriteStream<'_>, value: usize) -> CryptResult<()> {
    stream.write(&[0, 0, 0, 0])?;
    write_uint32(stream, value)
}

/// Write a 32-bit timestamp from UTC seconds since the epoch.
pub fn write_uint32_time(stream: &mut WriteStream<'_>, time: i64) -> CryptResult<()> {
    debug_assert!(time >= MIN_STORED_TIME);
    write_uint32(stream, time as usize)
}

/// Write a string preceded by a 32-bit length.
pub fn write_string32(stream: &mut WriteStream<'_>, string: &[u8]) -> CryptResult<()> {
    debug_assert!(!string.is_empty());
    write_uint32(stream, string.len())?;
    stream.write(string)
}

fn write_integer(
    stream: &mut WriteStream<'_>, integer: &[u8], prefix: LengthPrefix,
) -> CryptResult<()> {
    debug_assert!(!integer.is_empty() && integer.len() <= MAX_PKCSIZE);

    /* Integers can arrive from higher-level code with leading zeroes as
       part of the encoding; strip them before writing */
    let stripped = integer.iter().take_while(|&&b| b == 0).count();
    let integer = &integer[stripped..];
    debug_assert!(!integer.is_empty());

    match prefix {
        LengthPrefix::U16 => write_uint16(stream, integer.len())?,
        LengthPrefix::U16Bits => write_uint16(stream, bytes_to_bits(integer.len()))?,
        LengthPrefix::U32 => {
            /* MPIs are signed values */
            let leading_one_bit = integer[0] & 0x80 != 0;
            write_uint32(stream, integer.len() + usize::from(leading_one_bit))?;
            if leading_one_bit {
                stream.putc(0)?;
            }
        }
    }
    stream.write(integer)
}

/// Write a large integer with a 16-bit byte-count length.
pub fn write_integer16u(stream: &mut WriteStream<'_>, integer: &[u8]) -> CryptResult<()> {
    write_integer(stream, integer, LengthPrefix::U16)
}

/// Write a large integer with a 16-bit bit-count length, the bit count
/// being reconstructed from the byte length.
pub fn write_integer16u_bits(stream: &mut WriteStream<'_>, integer: &[u8]) -> CryptResult<()> {
    write_integer(stream, integer, LengthPrefix::U16Bits)
}

/// Write a large integer with a 32-bit signed-convention length.
pub fn write_integer32(stream: &mut WriteStream<'_>, integer: &[u8]) -> CryptResult<()> {
    write_integer(stream, integer, LengthPrefix::U32)
}

/// Encoded size of a bignum written with a 32-bit length prefix.
#[must_use]
pub fn sizeof_bignum_integer32<B: Bignum>(bignum: &B) -> usize {
    UINT32_SIZE + usize::from(bignum.high_bit()) + bignum.num_bytes()
}

fn write_bignum_integer<B: Bignum>(
    stream: &mut WriteStream<'_>, bignum: &B, prefix: LengthPrefix,
) -> CryptResult<()> {
    let mut buffer = [0u8; MAX_PKCSIZE];
    let result = (|| {
        let length = crate::bignum::export_bignum(&mut buffer, bignum)?;
        if prefix == LengthPrefix::U16Bits {
            /* A precise length in bits is needed rather than one
               reconstructed from the byte count, so write_integer()
               can't be used here */
            write_uint16(stream, bignum.num_bits())?;
            return stream.write(&buffer[..length]);
        }
        write_integer(stream, &buffer[..length], prefix)
    })();
    buffer.zeroize();
    result
}

/// Write a bignum with a 16-bit byte-count length.
pub fn write_bignum_integer16u<B: Bignum>(
    stream: &mut WriteStream<'_>, bignum: &B,
) -> CryptResult<()> {
    write_bignum_integer(stream, bignum, LengthPrefix::U16)
}

/// Write a bignum as an OpenPGP MPI with its precise bit count.
pub fn write_bignum_integer16u_bits<B: Bignum>(
    stream: &mut WriteStream<'_>, bignum: &B,
) -> CryptResult<()> {
    write_bignum_integer(stream, bignum, LengthPrefix::U16Bits)
}

/// Write a bignum with a 32-bit signed-convention length.
pub fn write_bignum_integer32<B: Bignum>(
    stream: &mut WriteStream<'_>, bignum: &B,
) -> CryptResult<()> {
    write_bignum_integer(stream, bignum, LengthPrefix::U32)
}
