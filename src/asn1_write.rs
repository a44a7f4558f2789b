//! ASN.1 BER/DER write routines.
//!
//! Writers emit bytes in exactly the order defined by the encoding, with
//! no buffering, so a null [`WriteStream`] run of the same code is an
//! exact length predictor for the real write.

use crate::asn1_read::{
    civil_from_days, make_ctag, make_ctag_primitive, Tag, BER_BITSTRING, BER_BOOLEAN,
    BER_ENUMERATED, BER_INTEGER, BER_NULL, BER_OCTETSTRING, BER_SEQUENCE, BER_SET,
    BER_STRING_BMP, BER_STRING_UTF8, BER_TIME_GENERALIZED, BER_TIME_UTC, MAX_CTAG_VALUE,
    MIN_STORED_TIME,
};
use crate::bignum::{export_bignum, Bignum};
use crate::stream::WriteStream;
use crate::{CryptResult, MAX_INTLENGTH, MAX_PKCSIZE};
use zeroize::Zeroize;

/// Encoded size of the length octets for a given length.
fn calculate_length_size(length: usize) -> usize {
    debug_assert!(length < MAX_INTLENGTH);

    /* Short form if possible, otherwise a length-of-length octet followed
       by an 8, 16, 24 or 32-bit length, ordered by likelihood */
    if length <= 0x7F {
        return 1;
    }
    if length <= 0xFF {
        return 1 + 1;
    }
    if length <= 0xFFFF {
        return 1 + 2;
    }
    if length <= 0xFF_FFFF {
        1 + 3
    } else {
        1 + 4
    }
}

/// Write the length octets for an ASN.1 item.
fn write_length(stream: &mut WriteStream<'_>, length: usize) -> CryptResult<()> {
    debug_assert!(length < MAX_INTLENGTH);

    /* Use the short form of the length octets if possible */
    if length <= 0x7F {
        return stream.putc(length as u8);
    }

    let no_length_octets = calculate_length_size(length) - 1;
    stream.putc(0x80 | no_length_octets as u8)?;
    for shift in (0..no_length_octets).rev() {
        stream.putc(((length >> (shift * 8)) & 0xFF) as u8)?;
    }
    Ok(())
}

/// Write a numeric value as a length byte followed by the minimal
/// big-endian content, with a zero sign byte when the high bit is set.
fn write_numeric(stream: &mut WriteStream<'_>, integer: i64) -> CryptResult<()> {
    debug_assert!(integer >= 0 && (integer as usize) < MAX_INTLENGTH);

    /* The value 0 is handled specially */
    if integer == 0 {
        return stream.write(&[0x01, 0x00]);
    }

    /* Assemble the encoded value in little-endian order, then make sure
       that the top bit doesn't inadvertently become a sign bit */
    let mut buffer = [0u8; 16];
    let mut length = 0;
    let mut value = integer;
    while value > 0 {
        buffer[length] = (value & 0xFF) as u8;
        value >>= 8;
        length += 1;
    }
    if buffer[length - 1] & 0x80 != 0 {
        buffer[length] = 0x00;
        length += 1;
    }

    /* Output the value in reverse (big-endian) order */
    stream.putc(length as u8)?;
    for i in (0..length).rev() {
        stream.putc(buffer[i])?;
    }
    Ok(())
}

/// The total encoded size of an object with `length` content bytes: tag,
/// length octets and content.
#[must_use]
pub fn sizeof_object(length: usize) -> usize {
    debug_assert!(length < MAX_INTLENGTH - 16);
    1 + calculate_length_size(length) + length
}

/// The content size of a bignum INTEGER.  The internal representation is
/// unsigned while the encoded form is signed, so a high top bit costs one
/// leading zero byte.
#[must_use]
pub fn signed_bignum_size<B: Bignum>(bignum: &B) -> usize {
    bignum.num_bytes() + usize::from(bignum.high_bit())
}

/// The total encoded size of a bignum INTEGER.
#[must_use]
pub fn sizeof_bignum<B: Bignum>(bignum: &B) -> usize {
    sizeof_object(signed_bignum_size(bignum))
}

fn primitive_tag(tag: Tag, default_tag: u8) -> u8 {
    debug_assert!(!matches!(tag, Tag::Ctx(value) if value >= MAX_CTAG_VALUE));
    match tag {
        Tag::None | Tag::Default => default_tag,
        Tag::Ctx(value) => make_ctag_primitive(value),
    }
}

/// Write a short (machine-word) INTEGER.
pub fn write_short_integer(
    stream: &mut WriteStream<'_>, integer: i64, tag: Tag,
) -> CryptResult<()> {
    stream.putc(primitive_tag(tag, BER_INTEGER))?;
    write_numeric(stream, integer)
}

/// Write a large INTEGER from its unsigned big-endian byte form, adding
/// the sign-padding zero byte when needed.
pub fn write_integer(
    stream: &mut WriteStream<'_>, integer: &[u8], tag: Tag,
) -> CryptResult<()> {
    let leading_zero = !integer.is_empty() && integer[0] & 0x80 != 0;

    stream.putc(primitive_tag(tag, BER_INTEGER))?;
    write_length(stream, integer.len() + usize::from(leading_zero))?;
    if leading_zero {
        stream.putc(0)?;
    }
    stream.write(integer)
}

/// Write a bignum as an INTEGER.
pub fn write_bignum_tag<B: Bignum>(
    stream: &mut WriteStream<'_>, bignum: &B, tag: Tag,
) -> CryptResult<()> {
    debug_assert!(!bignum.is_zero());

    /* A dummy write doesn't need the full encoding process.  This both
       speeds things up and avoids unnecessary copying of key data into
       memory */
    if stream.is_null() {
        return stream.skip(sizeof_bignum(bignum));
    }

    let mut buffer = [0u8; MAX_PKCSIZE];
    let result = export_bignum(&mut buffer, bignum)
        .and_then(|length| write_integer(stream, &buffer[..length], tag));
    buffer.zeroize();
    result
}

/// [`write_bignum_tag`] with the default INTEGER tag.
pub fn write_bignum<B: Bignum>(stream: &mut WriteStream<'_>, bignum: &B) -> CryptResult<()> {
    write_bignum_tag(stream, bignum, Tag::Default)
}

/// Write an ENUMERATED value.
pub fn write_enumerated(
    stream: &mut WriteStream<'_>, enumerated: i32, tag: Tag,
) -> CryptResult<()> {
    debug_assert!((0..1000).contains(&enumerated));
    stream.putc(primitive_tag(tag, BER_ENUMERATED))?;
    write_numeric(stream, i64::from(enumerated))
}

/// Write a NULL value.
pub fn write_null(stream: &mut WriteStream<'_>, tag: Tag) -> CryptResult<()> {
    stream.write(&[primitive_tag(tag, BER_NULL), 0])
}

/// Write a BOOLEAN value in its DER-canonical form.
pub fn write_boolean(stream: &mut WriteStream<'_>, boolean: bool, tag: Tag) -> CryptResult<()> {
    stream.write(&[primitive_tag(tag, BER_BOOLEAN), 1, if boolean { 0xFF } else { 0 }])
}

/// Write an OCTET STRING.
pub fn write_octet_string(
    stream: &mut WriteStream<'_>, string: &[u8], tag: Tag,
) -> CryptResult<()> {
    debug_assert!(!string.is_empty());
    stream.putc(primitive_tag(tag, BER_OCTETSTRING))?;
    write_length(stream, string.len())?;
    stream.write(string)
}

/// Write a character string.  As with the polymorphic read the tag is the
/// string type and is always given in encoded form.
pub fn write_character_string(
    stream: &mut WriteStream<'_>, string: &[u8], tag: u8,
) -> CryptResult<()> {
    debug_assert!(!string.is_empty());
    debug_assert!((BER_STRING_UTF8..=BER_STRING_BMP).contains(&tag)
                  || (make_ctag_primitive(0)..=make_ctag_primitive(MAX_CTAG_VALUE)).contains(&tag));
    stream.putc(tag)?;
    write_length(stream, string.len())?;
    stream.write(string)
}

/// Write a BIT STRING flag set.  ASN.1 bit strings start at bit 0 so the
/// bit order is reversed before writing.
pub fn write_bitstring(
    stream: &mut WriteStream<'_>, bit_string: u32, tag: Tag,
) -> CryptResult<()> {
    let mut data = bit_string;
    let mut value = 0u32;
    let mut no_bits = 0usize;
    for _ in 0..32 {
        if data > 0 {
            no_bits += 1;
        }
        value = (value << 1) | (data & 1);
        data >>= 1;
    }

    let content_bytes = (no_bits + 7) >> 3;
    stream.putc(primitive_tag(tag, BER_BITSTRING))?;
    write_length(stream, 1 + content_bytes)?;
    stream.putc((!(no_bits.wrapping_sub(1)) & 7) as u8)?;
    for i in 0..content_bytes {
        stream.putc(((value >> (24 - 8 * i)) & 0xFF) as u8)?;
    }
    Ok(())
}

fn write_two_digits(stream: &mut WriteStream<'_>, value: i64) -> CryptResult<()> {
    debug_assert!((0..100).contains(&value));
    stream.write(&[b'0' + (value / 10) as u8, b'0' + (value % 10) as u8])
}

fn write_time(
    stream: &mut WriteStream<'_>, time: i64, tag: Tag, is_utc: bool,
) -> CryptResult<()> {
    debug_assert!(time >= MIN_STORED_TIME);

    let (year, month, day) = civil_from_days(time.div_euclid(86_400));
    let seconds = time.rem_euclid(86_400);

    let default_tag = if is_utc { BER_TIME_UTC } else { BER_TIME_GENERALIZED };
    stream.putc(primitive_tag(tag, default_tag))?;
    stream.putc(if is_utc { 13 } else { 15 })?;
    if is_utc {
        write_two_digits(stream, year % 100)?;
    } else {
        write_two_digits(stream, year / 100)?;
        write_two_digits(stream, year % 100)?;
    }
    write_two_digits(stream, i64::from(month))?;
    write_two_digits(stream, i64::from(day))?;
    write_two_digits(stream, seconds / 3600)?;
    write_two_digits(stream, (seconds / 60) % 60)?;
    write_two_digits(stream, seconds % 60)?;
    stream.putc(b'Z')
}

/// Write a UTCTime value from UTC seconds since the epoch.
pub fn write_utc_time(stream: &mut WriteStream<'_>, time: i64, tag: Tag) -> CryptResult<()> {
    write_time(stream, time, tag, true)
}

/// Write a GeneralizedTime value from UTC seconds since the epoch.
pub fn write_generalized_time(
    stream: &mut WriteStream<'_>, time: i64, tag: Tag,
) -> CryptResult<()> {
    write_time(stream, time, tag, false)
}

/* Constructed-object headers.  The octet/bit-string hole writers create a
   normal or context-specific-tagged primitive string while the generic
   version writes a pure hole with no tag processing */

/// Write a SEQUENCE header for `length` content bytes.
pub fn write_sequence(stream: &mut WriteStream<'_>, length: usize) -> CryptResult<()> {
    stream.putc(BER_SEQUENCE)?;
    write_length(stream, length)
}

/// Write a SET header for `length` content bytes.
pub fn write_set(stream: &mut WriteStream<'_>, length: usize) -> CryptResult<()> {
    stream.putc(BER_SET)?;
    write_length(stream, length)
}

/// Write a constructed-object header: a SEQUENCE for `Tag::Default`, or a
/// constructed context-specific tag.
pub fn write_constructed(
    stream: &mut WriteStream<'_>, length: usize, tag: Tag,
) -> CryptResult<()> {
    let encoded = match tag {
        Tag::None | Tag::Default => BER_SEQUENCE,
        Tag::Ctx(value) => make_ctag(value),
    };
    stream.putc(encoded)?;
    write_length(stream, length)
}

/// Write an OCTET STRING hole header.
pub fn write_octet_string_hole(
    stream: &mut WriteStream<'_>, length: usize, tag: Tag,
) -> CryptResult<()> {
    stream.putc(primitive_tag(tag, BER_OCTETSTRING))?;
    write_length(stream, length)
}

/// Write a BIT STRING hole header, including the zero unused-bits octet.
pub fn write_bitstring_hole(
    stream: &mut WriteStream<'_>, length: usize, tag: Tag,
) -> CryptResult<()> {
    stream.putc(primitive_tag(tag, BER_BITSTRING))?;
    write_length(stream, length + 1)?; /* +1 for bit count */
    stream.putc(0)
}

/// Write a generic hole header with a caller-encoded tag.
pub fn write_generic_hole(
    stream: &mut WriteStream<'_>, length: usize, tag: u8,
) -> CryptResult<()> {
    stream.putc(tag)?;
    write_length(stream, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1_read;
    use crate::stream::ReadStream;

    #[test]
    fn length_encodings() {
        for (length, expected) in [
            (0usize, &[0x00u8][..]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x80]),
            (0xFF, &[0x81, 0xFF]),
            (0x100, &[0x82, 0x01, 0x00]),
            (0xFFFF, &[0x82, 0xFF, 0xFF]),
            (0x10000, &[0x83, 0x01, 0x00, 0x00]),
        ] {
            let mut buffer = [0u8; 8];
            let mut stream = WriteStream::new(&mut buffer);
            write_length(&mut stream, length).unwrap();
            let written = stream.tell();
            assert_eq!(&buffer[..written], expected, "length {length}");
            assert_eq!(written, calculate_length_size(length));
        }
    }

    #[test]
    fn null_stream_predicts_length() {
        let mut counter = WriteStream::null();
        write_sequence(&mut counter, 300).unwrap();
        assert_eq!(counter.tell(), sizeof_object(300) - 300);
    }

    #[test]
    fn short_integer_forms() {
        let mut buffer = [0u8; 16];
        let mut stream = WriteStream::new(&mut buffer);
        write_short_integer(&mut stream, 0, Tag::Default).unwrap();
        let len = stream.tell();
        assert_eq!(&buffer[..len], &[0x02, 0x01, 0x00]);

        // High bit forces a sign-padding byte
        let mut stream = WriteStream::new(&mut buffer);
        write_short_integer(&mut stream, 0x80, Tag::Default).unwrap();
        let len = stream.tell();
        assert_eq!(&buffer[..len], &[0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn boolean_and_null_forms() {
        let mut buffer = [0u8; 8];
        let mut stream = WriteStream::new(&mut buffer);
        write_boolean(&mut stream, true, Tag::Default).unwrap();
        write_null(&mut stream, Tag::Default).unwrap();
        let len = stream.tell();
        assert_eq!(&buffer[..len], &[0x01, 0x01, 0xFF, 0x05, 0x00]);
    }

    #[test]
    fn bitstring_round_trip() {
        for flags in [0u32, 1, 0b10, 0b1011, 0x8000_0001] {
            let mut buffer = [0u8; 16];
            let mut stream = WriteStream::new(&mut buffer);
            write_bitstring(&mut stream, flags, Tag::Default).unwrap();
            let len = stream.tell();
            let mut read = ReadStream::new(&buffer[..len]);
            assert_eq!(asn1_read::read_bitstring(&mut read).unwrap(), flags);
        }
    }

    #[test]
    fn time_round_trip() {
        for time in [820_454_400i64, 1_393_410_125, 2_524_608_000] {
            let mut buffer = [0u8; 32];
            let mut stream = WriteStream::new(&mut buffer);
            write_generalized_time(&mut stream, time, Tag::Default).unwrap();
            let len = stream.tell();
            let mut read = ReadStream::new(&buffer[..len]);
            assert_eq!(asn1_read::read_generalized_time(&mut read).unwrap(), time);
        }
        // UTCTime covers 1950-2049 only
        let mut buffer = [0u8; 32];
        let mut stream = WriteStream::new(&mut buffer);
        write_utc_time(&mut stream, 1_393_410_125, Tag::Default).unwrap();
        let len = stream.tell();
        assert_eq!(&buffer[..len], b"\x17\x0d140226102205Z");
    }
}
