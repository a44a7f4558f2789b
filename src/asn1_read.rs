//! ASN.1 BER/DER read routines.
//!
//! Everything here is built on two chokepoints: [`read_length_value`]
//! handles every BER length-encoding pitfall (indefinite lengths,
//! non-minimal leading zeroes, length-of-length overflow, signed/unsigned
//! confusion) exactly once, and [`check_tag`] rejects identifier octets
//! that no PKI object legitimately uses (application/private classes,
//! multi-byte tag numbers, out-of-range context tags).  Every reader for
//! a concrete type calls through these and inherits their invariants.
//!
//! Readers take the expected tag as a [`Tag`]: `Tag::Default` uses the
//! type's universal tag, `Tag::Ctx(n)` an implicitly-tagged
//! context-specific alternative, and `Tag::None` means the caller has
//! already consumed and checked the tag.

use crate::bignum::{import_bignum, Bignum, KeysizeCheck};
use crate::stream::ReadStream;
use crate::{
    CryptError, CryptResult, MAX_INTLENGTH, MAX_INTLENGTH_SHORT, MAX_OID_SIZE, MAX_PKCSIZE,
    MIN_OID_SIZE,
};
use zeroize::Zeroize;

/* Identifier-octet class and form bits */

/// Universal class bits.
pub const BER_UNIVERSAL: u8 = 0x00;
/// Application class bits (rejected by the readers).
pub const BER_APPLICATION: u8 = 0x40;
/// Context-specific class bits.
pub const BER_CONTEXT_SPECIFIC: u8 = 0x80;
/// Private class bits (rejected by the readers).
pub const BER_PRIVATE: u8 = 0xC0;
/// Constructed-form bit.
pub const BER_CONSTRUCTED: u8 = 0x20;
/// Mask selecting the class bits of an identifier octet.
pub const BER_CLASS_MASK: u8 = 0xC0;
/// Mask selecting the tag number of a short-form identifier octet.
pub const BER_SHORT_ID_MASK: u8 = 0x1F;

/* Universal tags used by PKI objects */

/// End-of-contents octet (not a valid tag).
pub const BER_EOC: u8 = 0x00;
/// BOOLEAN.
pub const BER_BOOLEAN: u8 = 0x01;
/// INTEGER.
pub const BER_INTEGER: u8 = 0x02;
/// BIT STRING.
pub const BER_BITSTRING: u8 = 0x03;
/// OCTET STRING.
pub const BER_OCTETSTRING: u8 = 0x04;
/// NULL.
pub const BER_NULL: u8 = 0x05;
/// OBJECT IDENTIFIER.
pub const BER_OBJECT_IDENTIFIER: u8 = 0x06;
/// ENUMERATED.
pub const BER_ENUMERATED: u8 = 0x0A;
/// UTF8String.
pub const BER_STRING_UTF8: u8 = 0x0C;
/// PrintableString.
pub const BER_STRING_PRINTABLE: u8 = 0x13;
/// T61String/TeletexString.
pub const BER_STRING_T61: u8 = 0x14;
/// IA5String.
pub const BER_STRING_IA5: u8 = 0x16;
/// UTCTime.
pub const BER_TIME_UTC: u8 = 0x17;
/// GeneralizedTime.
pub const BER_TIME_GENERALIZED: u8 = 0x18;
/// BMPString.
pub const BER_STRING_BMP: u8 = 0x1E;
/// SEQUENCE / SEQUENCE OF (encoded form, constructed bit included).
pub const BER_SEQUENCE: u8 = 0x10 | BER_CONSTRUCTED;
/// SET / SET OF (encoded form, constructed bit included).
pub const BER_SET: u8 = 0x11 | BER_CONSTRUCTED;

/// Context-specific tag numbers are confined to 0..MAX_CTAG_VALUE; anything
/// larger in supposedly-PKI data is noise or an attack.
pub const MAX_CTAG_VALUE: u8 = 16;

/// Build a constructed context-specific tag.
#[must_use]
pub fn make_ctag(value: u8) -> u8 {
    BER_CONTEXT_SPECIFIC | BER_CONSTRUCTED | value
}

/// Build a primitive context-specific tag.
#[must_use]
pub fn make_ctag_primitive(value: u8) -> u8 {
    BER_CONTEXT_SPECIFIC | value
}

/// How a reader should treat the identifier octet preceding a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// The caller has already read and checked the tag.
    None,
    /// Expect the type's default universal tag.
    Default,
    /// Expect an implicit primitive context-specific tag with this number.
    Ctx(u8),
}

impl Tag {
    /// The encoded identifier octet this selection expects, given the
    /// type's default tag, or `None` for `Tag::None`.
    #[must_use]
    pub fn select(self, default_tag: u8) -> Option<u8> {
        match self {
            Tag::None => None,
            Tag::Default => Some(default_tag),
            Tag::Ctx(value) => Some(make_ctag_primitive(value)),
        }
    }
}

/// A decoded ASN.1 length: either a definite byte count or the
/// indefinite-length marker (terminated later by an EOC pair).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Length {
    /// Definite length in bytes.
    Definite(usize),
    /// Indefinite-length encoding.
    Indefinite,
}

impl Length {
    /// The definite length, or `BadData` for an indefinite encoding in a
    /// context that cannot accept one.
    pub fn definite(self) -> CryptResult<usize> {
        match self {
            Length::Definite(len) => Ok(len),
            Length::Indefinite => Err(CryptError::BadData),
        }
    }
}

/* When reading numeric values the encoder whose data we're processing may
   have added spurious leading zero padding.  This is the maximum number of
   bytes of data accepted before leading zeroes are stripped */

const MAX_NUMERIC_DATA_BYTES: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq)]
enum LengthType {
    Short,
    ShortIndef,
    LongIndef,
}

/// Read a big-endian numeric value of `value_byte_count` bytes, tolerating
/// non-minimal leading zeroes but keeping at most 2 (short) or 4 (long)
/// bytes of actual data.
fn read_numeric_value(
    stream: &mut ReadStream<'_>, value_byte_count: usize, zero_value_ok: bool,
    short_length: bool,
) -> CryptResult<usize> {
    debug_assert!(value_byte_count >= 1 && value_byte_count <= MAX_NUMERIC_DATA_BYTES);

    let mut buffer = [0u8; MAX_NUMERIC_DATA_BYTES];
    stream.read(&mut buffer[..value_byte_count])?;
    let mut data = &buffer[..value_byte_count];

    /* Handle leading zero octets (a single zero byte is OK, since it's an
       encoding of a zero value).  BER lengths can be encoded in peculiar
       ways (at least one text uses a big-endian 32-bit encoding for
       everything) so up to MAX_NUMERIC_DATA_BYTES of non-DER length data
       are allowed, but only the last 2 or 4 of these can be nonzero */
    if data[0] == 0 && data.len() > 1 {
        let zeroes = data.iter().take_while(|&&b| b == 0).count();
        data = &data[zeroes..];
        if data.is_empty() {
            /* Very broken encoding of a zero length */
            return Ok(0);
        }
    }
    if data.len() > if short_length { 2 } else { 4 } {
        return Err(stream.set_error(CryptError::BadData));
    }

    /* Accumulate the value, checking for overflow at each step */
    let mut value = 0usize;
    for &byte in data {
        if value >= (MAX_INTLENGTH >> 8) || (value << 8) >= MAX_INTLENGTH - usize::from(byte) {
            return Err(stream.set_error(CryptError::BadData));
        }
        value = (value << 8) | usize::from(byte);
    }
    if short_length {
        if value >= MAX_INTLENGTH_SHORT + 1 {
            /* Length must be < 32K for short lengths */
            return Err(stream.set_error(CryptError::Overflow));
        }
    } else if value > MAX_INTLENGTH {
        return Err(stream.set_error(CryptError::Overflow));
    }
    if value == 0 && !zero_value_ok {
        return Err(stream.set_error(CryptError::BadData));
    }

    Ok(value)
}

/// Read the length octets for an ASN.1 item:
///
/// ```text
/// 0x00-0x7F                   basic length
/// 0x80                        indefinite
/// 0x81 0xnn                   8-bit length
/// 0x82 0xnn 0xnn              16-bit length
/// 0x83 0xnn 0xnn 0xnn         24-bit length
/// 0x84 0xnn 0xnn 0xnn 0xnn    32-bit length
/// ```
///
/// The short-length read is limited to `MAX_INTLENGTH_SHORT`, a sane limit
/// for most PKI data.  Indefinite lengths are only reported when the mode
/// permits them.
fn read_length_value(
    stream: &mut ReadStream<'_>, read_type: LengthType,
) -> CryptResult<Length> {
    let short_len = read_type != LengthType::LongIndef;

    /* If it's a short length we're done */
    let first = stream.getc()?;
    if first & 0x80 == 0 {
        return Ok(Length::Definite(usize::from(first)));
    }

    let no_length_octets = usize::from(first & 0x7F);
    if no_length_octets == 0 {
        /* If indefinite lengths aren't allowed, signal an error */
        if read_type == LengthType::Short {
            return Err(stream.set_error(CryptError::BadData));
        }
        return Ok(Length::Indefinite);
    }
    if no_length_octets > MAX_NUMERIC_DATA_BYTES {
        return Err(stream.set_error(CryptError::BadData));
    }

    let value = read_numeric_value(stream, no_length_octets, false, short_len)?;
    Ok(Length::Definite(value))
}

/// Long-form, indefinite-tolerant length read for the whole-encoding
/// validator.
pub(crate) fn read_length_relaxed(stream: &mut ReadStream<'_>) -> CryptResult<Length> {
    read_length_value(stream, LengthType::LongIndef)
}

/// Tag plausibility check: not an EOC, not a multi-byte tag number, not an
/// application- or private-class tag, and a context-specific number in
/// range.
fn check_tag(tag: u8) -> bool {
    if tag == BER_EOC {
        return false;
    }
    if tag & BER_SHORT_ID_MASK == BER_SHORT_ID_MASK {
        /* High-tag-number (multi-byte) form, not used by anything */
        return false;
    }
    if tag & BER_CLASS_MASK == BER_APPLICATION || tag & BER_CLASS_MASK == BER_PRIVATE {
        return false;
    }
    if tag & BER_CLASS_MASK == BER_CONTEXT_SPECIFIC
        && tag & BER_SHORT_ID_MASK >= MAX_CTAG_VALUE
    {
        return false;
    }
    true
}

/// Read an identifier octet, rejecting implausible values.
pub fn read_tag(stream: &mut ReadStream<'_>) -> CryptResult<u8> {
    let tag = stream.getc()?;
    if !check_tag(tag) {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(tag)
}

/// Peek at the next identifier octet without consuming it, rejecting
/// implausible values.
pub fn peek_tag(stream: &mut ReadStream<'_>) -> CryptResult<u8> {
    let tag = stream.peek()?;
    if !check_tag(tag) {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(tag)
}

/// Check for (and consume) constructed-data end-of-contents octets.
///
/// Returns `Ok(true)` and consumes two bytes iff the next byte is `0x00`
/// and is followed by a second `0x00`; returns `Ok(false)` without
/// consuming anything if the next byte isn't an EOC candidate.  A lone
/// zero byte is an encoding error.
pub fn check_eoc(stream: &mut ReadStream<'_>) -> CryptResult<bool> {
    /* peek_tag()/read_tag() can't be used for this because an EOC isn't a
       valid tag */
    let tag = stream.peek()?;
    if tag != BER_EOC {
        return Ok(false);
    }
    let mut eoc = [0u8; 2];
    stream.read(&mut eoc)?;
    if eoc != [0, 0] {
        /* An EOC tag needs to be combined with a length of zero */
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(true)
}

/// Read a short (<= 256 byte) raw object, header and all, without decoding
/// it.  Used for data blocks like object identifiers that are only ever
/// handled in encoded form.  Returns the stored length.
pub fn read_raw_object(
    stream: &mut ReadStream<'_>, buffer: &mut [u8], tag: Option<u8>,
) -> CryptResult<usize> {
    debug_assert!(buffer.len() >= 3, "need room for tag, length and one content byte");

    let mut offset = 0;

    /* Read the identifier field and length.  Each byte has to be retained
       as it's read, so read_length_value() can't be used for the length,
       but only lengths encoded in one or two bytes need handling here.
       Since this reads a complete encoded object the tag (if known) must
       be fully specified, so there's no default-tag option */
    if let Some(expected) = tag {
        let object_tag = read_tag(stream)?;
        if object_tag != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
        buffer[offset] = object_tag;
        offset += 1;
    }
    let mut length = usize::from(stream.getc()?);
    buffer[offset] = length as u8;
    offset += 1;
    if length & 0x80 != 0 {
        /* Indefinite-length or longer than 256 bytes (length-of-length
           other than 1) isn't handled here */
        if length != 0x81 {
            return Err(stream.set_error(CryptError::BadData));
        }

        /* Certain types should never have a length that can't be encoded
           in a single byte; finding one is an error.  This check exists
           mostly to catch malformed OIDs, which are only ever processed in
           raw form, so a non-canonical encoding would produce an OID that
           can never be matched */
        if let Some(expected) = tag {
            if matches!(
                expected,
                BER_BOOLEAN
                    | BER_OBJECT_IDENTIFIER
                    | BER_ENUMERATED
                    | BER_TIME_UTC
                    | BER_TIME_GENERALIZED
            ) {
                return Err(stream.set_error(CryptError::BadData));
            }
        }

        length = usize::from(stream.getc()?);
        buffer[offset] = length as u8;
        offset += 1;
    }
    if length == 0 || length > 0xFF {
        return Err(stream.set_error(CryptError::BadData));
    }
    if offset + length > buffer.len() {
        /* Treated as a stream error even though technically it's an
           insufficient-buffer-space condition, because the object has
           violated the caller's implicit format constraint */
        return Err(stream.set_error(CryptError::Overflow));
    }

    stream.read(&mut buffer[offset..offset + length])?;
    Ok(offset + length)
}

/// Read a constrained-length data value.  `length` may exceed the buffer,
/// in which case the value is truncated into the buffer and the excess is
/// skipped; this is acceptable only for opaque blobs (certificate serial
/// numbers, over-long text strings in broken certificates).
fn read_constrained_data(
    stream: &mut ReadStream<'_>, buffer: Option<&mut [u8]>, length: usize,
) -> CryptResult<usize> {
    let Some(buffer) = buffer else {
        stream.skip(length, MAX_INTLENGTH_SHORT)?;
        return Ok(length);
    };

    if length <= buffer.len() {
        stream.read(&mut buffer[..length])?;
        return Ok(length);
    }

    /* Read as much as fits and discard the rest */
    let max = buffer.len();
    stream.read(buffer)?;
    stream.skip(length - max, MAX_INTLENGTH_SHORT)?;
    Ok(max)
}

/* Integer header shared by the integer-as-bytes and integer-as-bignum
   readers: reads the tag and length and strips leading zero bytes */

fn read_integer_header(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<usize> {
    if let Some(expected) = tag.select(BER_INTEGER) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    let length = read_length_value(stream, LengthType::Short)?.definite()?;
    if length == 0 {
        return Ok(0); /* Zero-length data */
    }

    /* ASN.1 encoded values are signed while the internal representation is
       unsigned, so skip any leading zero bytes used to encode a value with
       the high bit set.  A value with the (supposed) sign bit set is
       treated as unsigned since a number of implementations get this
       wrong.  As with length encodings, up to MAX_NUMERIC_DATA_BYTES of
       non-DER leading zeroes are allowed */
    let mut no_leading_zeroes = 0;
    while no_leading_zeroes < length
        && no_leading_zeroes < MAX_NUMERIC_DATA_BYTES
        && stream.peek()? == 0
    {
        stream.getc()?;
        no_leading_zeroes += 1;
    }
    if no_leading_zeroes >= MAX_NUMERIC_DATA_BYTES {
        return Err(stream.set_error(CryptError::BadData));
    }

    Ok(length - no_leading_zeroes)
}

/// Read a large INTEGER as an opaque byte blob, optionally checking an
/// explicit or default tag first.  Returns the number of bytes stored;
/// over-long values are truncated into the buffer (acceptable only for
/// opaque blobs such as certificate serial numbers).
pub fn read_integer_tag(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>, tag: Tag,
) -> CryptResult<usize> {
    let length = read_integer_header(stream, tag)?;
    if length == 0 {
        return Ok(0); /* Zero-length data */
    }
    read_constrained_data(stream, integer, length)
}

/// [`read_integer_tag`] with the default INTEGER tag.
pub fn read_integer(
    stream: &mut ReadStream<'_>, integer: Option<&mut [u8]>,
) -> CryptResult<usize> {
    read_integer_tag(stream, integer, Tag::Default)
}

fn read_bignum_integer<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>, tag: Tag, check_type: KeysizeCheck,
) -> CryptResult<()> {
    debug_assert!(min_length > 0 && min_length <= max_length && max_length <= MAX_PKCSIZE);

    let length = read_integer_header(stream, tag)?;
    if length == 0 {
        /* It's a read of a zero value, make it explicit */
        bignum.set_zero();
        return Ok(());
    }

    /* Read the value into a fixed buffer and import it under the caller's
       range policy */
    if length > MAX_PKCSIZE {
        return Err(stream.set_error(CryptError::Overflow));
    }
    let mut buffer = [0u8; MAX_PKCSIZE];
    let result = (|| {
        stream.read(&mut buffer[..length])?;
        import_bignum(bignum, &buffer[..length], min_length, max_length, max_range, check_type)
            .map_err(|err| stream.set_error(err))
    })();
    buffer.zeroize();
    result
}

/// Read an INTEGER into a bignum, enforcing `min_length..=max_length` on
/// the encoded size and an optional exclusive upper bound on the value.
pub fn read_bignum_tag<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>, tag: Tag,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, max_range, tag,
                        KeysizeCheck::None)
}

/// [`read_bignum_tag`] with the default INTEGER tag.
pub fn read_bignum<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>,
) -> CryptResult<()> {
    read_bignum_tag(stream, bignum, min_length, max_length, max_range, Tag::Default)
}

/// Bignum read that explicitly checks for a too-short key and reports it
/// as not-secure rather than the bad-data that would otherwise be
/// returned.
pub fn read_bignum_checked<B: Bignum>(
    stream: &mut ReadStream<'_>, bignum: &mut B, min_length: usize, max_length: usize,
    max_range: Option<&B>,
) -> CryptResult<()> {
    read_bignum_integer(stream, bignum, min_length, max_length, max_range, Tag::Default,
                        KeysizeCheck::Pkc)
}

/// Read a universal type's length and content and discard both, used to
/// skip unknown or unwanted types when the tag has already been consumed.
pub fn read_universal_data(stream: &mut ReadStream<'_>) -> CryptResult<()> {
    let length = read_length_value(stream, LengthType::Short)?.definite()?;
    if length == 0 {
        return Ok(()); /* Zero-length data */
    }
    stream.skip(length, MAX_INTLENGTH_SHORT)
}

/// Read a universal type and discard it, tag and all.
pub fn read_universal(stream: &mut ReadStream<'_>) -> CryptResult<()> {
    read_tag(stream)?;
    read_universal_data(stream)
}

/* Read a (non-bignum) numeric value, shared by the short-integer and
   enumerated readers */

fn read_numeric(stream: &mut ReadStream<'_>, tag: Tag, is_integer: bool) -> CryptResult<i64> {
    let default_tag = if is_integer { BER_INTEGER } else { BER_ENUMERATED };
    if let Some(expected) = tag.select(default_tag) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    let length = read_length_value(stream, LengthType::Short)?.definite()?;
    if length == 0 {
        return Ok(0); /* Zero-length data */
    }
    if length > MAX_NUMERIC_DATA_BYTES {
        /* Up to MAX_NUMERIC_DATA_BYTES of data are allowed to accommodate
           broken encodings that add leading zeroes; the actual value's
           range is checked in read_numeric_value() */
        return Err(stream.set_error(CryptError::BadData));
    }
    let value = read_numeric_value(stream, length, true, false)?;
    Ok(value as i64)
}

/// Read a short (machine-word) INTEGER value.
pub fn read_short_integer_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<i64> {
    read_numeric(stream, tag, true)
}

/// [`read_short_integer_tag`] with the default tag.
pub fn read_short_integer(stream: &mut ReadStream<'_>) -> CryptResult<i64> {
    read_short_integer_tag(stream, Tag::Default)
}

/// Read an ENUMERATED value.  This is encoded like an ASN.1 INTEGER so it
/// is read as one; values outside 0..=1000 are implausible for any
/// protocol enumeration and are rejected.
pub fn read_enumerated_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<i32> {
    let value = read_numeric(stream, tag, false)?;
    if !(0..=1000).contains(&value) {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(value as i32)
}

/// [`read_enumerated_tag`] with the default tag.
pub fn read_enumerated(stream: &mut ReadStream<'_>) -> CryptResult<i32> {
    read_enumerated_tag(stream, Tag::Default)
}

/// Read a NULL value.
pub fn read_null_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<()> {
    if let Some(expected) = tag.select(BER_NULL) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    if stream.getc()? != 0 {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(())
}

/// [`read_null_tag`] with the default tag.
pub fn read_null(stream: &mut ReadStream<'_>) -> CryptResult<()> {
    read_null_tag(stream, Tag::Default)
}

/// Read a BOOLEAN value.  The DER-canonical true is `0xFF` but any
/// non-zero content byte is accepted as true.
pub fn read_boolean_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<bool> {
    if let Some(expected) = tag.select(BER_BOOLEAN) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    let mut buffer = [0u8; 2];
    stream.read(&mut buffer)?;
    if buffer[0] != 1 {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(buffer[1] != 0)
}

/// [`read_boolean_tag`] with the default tag.
pub fn read_boolean(stream: &mut ReadStream<'_>) -> CryptResult<bool> {
    read_boolean_tag(stream, Tag::Default)
}

/* OID handling.  OIDs are never decoded, only compared byte-for-byte in
   encoded form */

/// One entry of an OID dispatch table: a complete encoded OID (tag,
/// single-byte length, content) and the value to return when it matches.
#[derive(Clone, Copy, Debug)]
pub struct OidInfo<T: Copy> {
    /// The complete encoded OID.
    pub oid: &'static [u8],
    /// Selection value returned on a match.
    pub selection: T,
}

/// Wildcard entry that matches any otherwise-unmatched OID.  Must be the
/// last entry of a dispatch table.
pub const WILDCARD_OID: &[u8] = &[0x06, 0x04, 0x78, 0x78, 0x78, 0x78];

/// The total encoded size of an OID from its single-byte length field.
#[must_use]
pub fn sizeof_oid(oid: &[u8]) -> usize {
    debug_assert!(oid.len() >= 2 && oid[0] == BER_OBJECT_IDENTIFIER);
    2 + usize::from(oid[1])
}

/// Read an OID and return the table entry it matches.
///
/// Related groups of OIDs typically differ only in their last byte, so the
/// last byte is used as a quick-reject filter before the full compare.
pub fn read_oid_ex<'t, T: Copy>(
    stream: &mut ReadStream<'_>, oid_selection: &'t [OidInfo<T>],
) -> CryptResult<&'t OidInfo<T>> {
    debug_assert!(!oid_selection.is_empty() && oid_selection.len() <= 50);

    let mut buffer = [0u8; MAX_OID_SIZE];
    let length = read_raw_object(stream, &mut buffer, Some(BER_OBJECT_IDENTIFIER))?;

    for entry in oid_selection {
        /* Check for a match-any wildcard, which must be the last entry */
        if entry.oid.len() == WILDCARD_OID.len() && entry.oid == WILDCARD_OID {
            return Ok(entry);
        }

        /* Check for a standard OID match */
        if length == entry.oid.len()
            && buffer[length - 1] == entry.oid[length - 1]
            && buffer[..length] == *entry.oid
        {
            return Ok(entry);
        }
    }
    Err(stream.set_error(CryptError::BadData))
}

/// Read an OID against a dispatch table, returning the matched entry's
/// selection value.
pub fn read_oid<T: Copy>(
    stream: &mut ReadStream<'_>, oid_selection: &[OidInfo<T>],
) -> CryptResult<T> {
    read_oid_ex(stream, oid_selection).map(|entry| entry.selection)
}

/// Read an OID that must match a single fixed value.
pub fn read_fixed_oid(stream: &mut ReadStream<'_>, oid: &'static [u8]) -> CryptResult<()> {
    debug_assert!(oid.len() >= MIN_OID_SIZE && oid.len() <= MAX_OID_SIZE);
    debug_assert!(oid[0] == BER_OBJECT_IDENTIFIER && sizeof_oid(oid) == oid.len());

    read_oid(stream, &[OidInfo { oid, selection: () }])
}

/// Read a raw OID, tag and length included, into the caller's buffer for
/// later byte-exact comparison.
pub fn read_encoded_oid(
    stream: &mut ReadStream<'_>, oid: &mut [u8], tag: Option<u8>,
) -> CryptResult<usize> {
    debug_assert!(oid.len() >= MIN_OID_SIZE);
    debug_assert!(tag.is_none() || tag == Some(BER_OBJECT_IDENTIFIER));

    /* Read the encoded OID and make sure that it's the right size for a
       minimal-length OID: tag (optional) + length + three content bytes */
    let length = read_raw_object(stream, oid, tag)?;
    if length < usize::from(tag.is_some()) + 1 + 3 {
        return Err(stream.set_error(CryptError::BadData));
    }
    Ok(length)
}

/// Read an OCTET STRING of between `min_length` and `max_length` bytes.
/// Unlike the character-string read the length limit is hard: over-long
/// content is an overflow, not a truncation.  Passing no buffer skips the
/// content.
pub fn read_octet_string_tag(
    stream: &mut ReadStream<'_>, string: Option<&mut [u8]>, min_length: usize,
    max_length: usize, tag: Tag,
) -> CryptResult<usize> {
    debug_assert!(min_length > 0 && min_length <= max_length && max_length < MAX_INTLENGTH_SHORT);

    if let Some(expected) = tag.select(BER_OCTETSTRING) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    let length = read_length_value(stream, LengthType::Short)?.definite()?;
    if length < min_length {
        return Err(stream.set_error(CryptError::Underflow));
    }
    if length > max_length || length >= MAX_INTLENGTH_SHORT {
        return Err(stream.set_error(CryptError::Overflow));
    }
    read_constrained_data(stream, string, length)
}

/// [`read_octet_string_tag`] with the default tag.
pub fn read_octet_string(
    stream: &mut ReadStream<'_>, string: Option<&mut [u8]>, min_length: usize,
    max_length: usize,
) -> CryptResult<usize> {
    read_octet_string_tag(stream, string, min_length, max_length, Tag::Default)
}

/// Read one of the myriad ASN.1 character-string types.  The tag is
/// mandatory and fully encoded because the function is polymorphic: the
/// tag *is* the string type, and the higher-level routines that read
/// these invariably sort out the valid tag types themselves.  Over-long
/// content is silently truncated into the buffer.
pub fn read_character_string(
    stream: &mut ReadStream<'_>, string: Option<&mut [u8]>, max_length: usize, tag: u8,
) -> CryptResult<usize> {
    debug_assert!(max_length > 0 && max_length < MAX_INTLENGTH_SHORT);

    if read_tag(stream)? != tag {
        return Err(stream.set_error(CryptError::BadData));
    }
    let length = read_length_value(stream, LengthType::Short)?.definite()?;
    if length == 0 {
        return Err(stream.set_error(CryptError::Underflow));
    }
    if length >= MAX_INTLENGTH_SHORT {
        return Err(stream.set_error(CryptError::Overflow));
    }
    let string = string.map(|s| {
        let cap = s.len().min(max_length);
        &mut s[..cap]
    });
    read_constrained_data(stream, string, length)
}

/// Read a BIT STRING used as a compact flag set (at most 32 bits).
///
/// ASN.1 bit strings start at bit 0, i.e. the most significant encoded bit
/// is flag 0, so the bit order is reversed before the value is returned.
pub fn read_bitstring_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<u32> {
    /* The only place where bit strings of more than one or two bytes turn
       up is CMP's bizarre encoding of error subcodes, so 4 bytes of
       content is all that's accepted */
    if let Some(expected) = tag.select(BER_BITSTRING) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    let mut length = usize::from(stream.getc()?);
    if length == 0 {
        /* The unused-bit-count byte is part of the content */
        return Err(stream.set_error(CryptError::BadData));
    }
    length -= 1; /* Adjust for bit count */
    if length > 4 {
        return Err(stream.set_error(CryptError::BadData));
    }
    let unused_bits = usize::from(stream.getc()?);
    if unused_bits > 7 {
        return Err(stream.set_error(CryptError::BadData));
    }
    if length == 0 {
        return Ok(0); /* Zero value */
    }

    /* Convert the unused-remainder count into the total bit count */
    let no_bits = length * 8 - unused_bits;

    /* Accumulate the content big-endian, then reverse the bit order */
    let mut data = 0u32;
    for _ in 0..length {
        data = (data << 8) | u32::from(stream.getc()?);
    }
    let mask = 1u32 << (length * 8 - 1);
    let mut value = 0u32;
    let mut flag = 1u32;
    for _ in 0..no_bits {
        if data & mask != 0 {
            value |= flag;
        }
        data <<= 1;
        flag <<= 1;
    }
    Ok(value)
}

/// [`read_bitstring_tag`] with the default tag.
pub fn read_bitstring(stream: &mut ReadStream<'_>) -> CryptResult<u32> {
    read_bitstring_tag(stream, Tag::Default)
}

/* Time handling.  Decoded times are returned as UTC seconds since the
   epoch; display-time localisation is the caller's problem (the legacy
   behaviour of converting through local time is wrong by an hour around
   DST switchovers and has been dropped) */

/// No stored PKI object predates 1996; times before this are garbage.
pub const MIN_STORED_TIME: i64 = (1996 - 1970) * 365 * 86_400;

/// Plausibility ceiling for stored times (year 2100).
pub const MAX_STORED_TIME: i64 = (2100 - 1970) * 365 * 86_400;

/// Days from 1970-01-01 for a proleptic-Gregorian civil date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Civil date for a day count from 1970-01-01 (inverse of
/// [`days_from_civil`]).
pub(crate) fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    (year + i64::from(month <= 2), month as u32, day as u32)
}

fn get_digits(data: &[u8], min: i64, max: i64) -> CryptResult<i64> {
    let value = i64::from(data[0] - b'0') * 10 + i64::from(data[1] - b'0');
    if value < min || value > max {
        return Err(CryptError::BadData);
    }
    Ok(value)
}

fn read_time(stream: &mut ReadStream<'_>, is_utc: bool) -> CryptResult<i64> {
    /* Only one encoding length is allowed although in theory the value
       could range from 11 to 17 bytes for UTCTime and 13 to 19 for
       GeneralizedTime.  (11-byte UTCTimes without seconds were formerly
       accepted for one obsolete national CA whose certs have since
       expired) */
    let length = usize::from(stream.getc()?);
    if length != if is_utc { 13 } else { 15 } {
        return Err(stream.set_error(CryptError::BadData));
    }

    let mut buffer = [0u8; 16];
    stream.read(&mut buffer[..length])?;
    let data = &buffer[..length];
    if !data[..length - 1].iter().all(u8::is_ascii_digit) || data[length - 1] != b'Z' {
        return Err(stream.set_error(CryptError::BadData));
    }

    let result = (|| {
        let mut pos = 0;
        let century = if is_utc {
            0
        } else {
            let century = get_digits(&data[0..], 19, 20)?;
            pos = 2;
            (century - 19) * 100
        };
        let mut year = get_digits(&data[pos..], 0, 99)? + century;
        let month = get_digits(&data[pos + 2..], 1, 12)?;
        let day = get_digits(&data[pos + 4..], 1, 31)?;
        let hour = get_digits(&data[pos + 6..], 0, 23)?;
        let minute = get_digits(&data[pos + 8..], 0, 59)?;
        let second = get_digits(&data[pos + 10..], 0, 59)?;

        /* UTCTime can't express the century, so years < 50 are
           2000-relative and the rest 1900-relative */
        if is_utc && year < 50 {
            year += 100;
        }
        let days = days_from_civil(1900 + year, month, day);
        let time = days * 86_400 + hour * 3600 + minute * 60 + second;
        if !(MIN_STORED_TIME..MAX_STORED_TIME).contains(&time) {
            return Err(CryptError::BadData);
        }
        Ok(time)
    })();
    result.map_err(|err| stream.set_error(err))
}

/// Read a UTCTime value, returning UTC seconds since the epoch.
pub fn read_utc_time_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<i64> {
    if let Some(expected) = tag.select(BER_TIME_UTC) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    read_time(stream, true)
}

/// [`read_utc_time_tag`] with the default tag.
pub fn read_utc_time(stream: &mut ReadStream<'_>) -> CryptResult<i64> {
    read_utc_time_tag(stream, Tag::Default)
}

/// Read a GeneralizedTime value, returning UTC seconds since the epoch.
pub fn read_generalized_time_tag(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<i64> {
    if let Some(expected) = tag.select(BER_TIME_GENERALIZED) {
        if read_tag(stream)? != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    read_time(stream, false)
}

/// [`read_generalized_time_tag`] with the default tag.
pub fn read_generalized_time(stream: &mut ReadStream<'_>) -> CryptResult<i64> {
    read_generalized_time_tag(stream, Tag::Default)
}

/****************************************************************************
*                                                                           *
*                   Read routines for constructed objects                   *
*                                                                           *
****************************************************************************/

/* The header read for a constructed object performs a stricter check than
   check_tag() because the permitted values for a constructed object or
   hole are known */

fn check_read_tag(
    stream: &mut ReadStream<'_>, tag: Option<u8>, allow_relaxed_match: bool,
) -> CryptResult<()> {
    let tag_value = read_tag(stream)?;
    if let Some(expected) = tag {
        if tag_value != expected {
            return Err(stream.set_error(CryptError::BadData));
        }
        return Ok(());
    }

    /* Even when (almost) any tag is acceptable it still has to be a valid
       hole: BIT STRING, primitive or constructed OCTET STRING, SEQUENCE,
       or SET */
    if matches!(
        tag_value,
        BER_BITSTRING | BER_OCTETSTRING | BER_SEQUENCE | BER_SET
    ) || tag_value == BER_OCTETSTRING | BER_CONSTRUCTED
    {
        return Ok(());
    }

    /* Context-specific tagged items up to MAX_CTAG_VALUE are also fine */
    if tag_value & BER_CLASS_MASK == BER_CONTEXT_SPECIFIC
        && tag_value & BER_SHORT_ID_MASK <= MAX_CTAG_VALUE
    {
        return Ok(());
    }

    /* When reading a genuine blob rather than a constructed object a wider
       range of tags is allowed; currently only INTEGERs are read this way,
       from their use as generic blobs in certificate serial numbers */
    if allow_relaxed_match && tag_value == BER_INTEGER {
        return Ok(());
    }

    Err(stream.set_error(CryptError::BadData))
}

fn read_object_header(
    stream: &mut ReadStream<'_>, min_length: usize, tag: Option<u8>, allow_indef: bool,
    is_bitstring: bool, relaxed: bool,
) -> CryptResult<Length> {
    check_read_tag(stream, tag, relaxed)?;
    let length_type = if allow_indef { LengthType::ShortIndef } else { LengthType::Short };
    let mut length = read_length_value(stream, length_type)?;

    /* A bit string has an extra unused-bits count.  Since this is a hole
       encoding the actual value doesn't matter beyond a sanity check */
    if is_bitstring {
        if let Length::Definite(value) = length {
            if value == 0 {
                return Err(stream.set_error(CryptError::BadData));
            }
            length = Length::Definite(value - 1);
        }
        let unused = stream.getc()?;
        if unused > 7 {
            return Err(stream.set_error(CryptError::BadData));
        }
    }

    if let Length::Definite(value) = length {
        if value < min_length || value >= MAX_INTLENGTH_SHORT {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    Ok(length)
}

fn read_long_object_header(
    stream: &mut ReadStream<'_>, min_length: usize, tag: Option<u8>, relaxed: bool,
) -> CryptResult<Length> {
    check_read_tag(stream, tag, relaxed)?;
    let length = read_length_value(stream, LengthType::LongIndef)?;
    if let Length::Definite(value) = length {
        if value < min_length || value > MAX_INTLENGTH {
            return Err(stream.set_error(CryptError::BadData));
        }
    }
    Ok(length)
}

fn constructed_tag(tag: Tag) -> Option<u8> {
    match tag {
        Tag::None | Tag::Default => Some(BER_SEQUENCE),
        Tag::Ctx(value) => Some(make_ctag(value)),
    }
}

/// Read a SEQUENCE header, returning the non-zero content length.
pub fn read_sequence(stream: &mut ReadStream<'_>) -> CryptResult<usize> {
    read_object_header(stream, 1, Some(BER_SEQUENCE), false, false, false)?.definite()
}

/// Read a SEQUENCE header whose content may be zero-length.
pub fn read_sequence_z(stream: &mut ReadStream<'_>) -> CryptResult<usize> {
    read_object_header(stream, 0, Some(BER_SEQUENCE), false, false, false)?.definite()
}

/// Read a SEQUENCE header, permitting an indefinite length.
pub fn read_sequence_indef(stream: &mut ReadStream<'_>) -> CryptResult<Length> {
    read_object_header(stream, 1, Some(BER_SEQUENCE), true, false, false)
}

/// Read a SET header, returning the non-zero content length.
pub fn read_set(stream: &mut ReadStream<'_>) -> CryptResult<usize> {
    read_object_header(stream, 1, Some(BER_SET), false, false, false)?.definite()
}

/// Read a SET header, permitting an indefinite length.
pub fn read_set_indef(stream: &mut ReadStream<'_>) -> CryptResult<Length> {
    read_object_header(stream, 1, Some(BER_SET), true, false, false)
}

/// Read a constructed-object header: a SEQUENCE for `Tag::Default`, or a
/// constructed context-specific tag.
pub fn read_constructed(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<usize> {
    read_object_header(stream, 1, constructed_tag(tag), false, false, false)?.definite()
}

/// [`read_constructed`] permitting an indefinite length.
pub fn read_constructed_indef(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<Length> {
    read_object_header(stream, 1, constructed_tag(tag), true, false, false)
}

/// Read the header of an OCTET STRING hole: an octet string whose content
/// is structured data parsed by someone else.  The header is consumed and
/// the content length returned with the content left on the stream.
pub fn read_octet_string_hole(
    stream: &mut ReadStream<'_>, min_length: usize, tag: Tag,
) -> CryptResult<usize> {
    let expected = match tag {
        Tag::None | Tag::Default => Some(BER_OCTETSTRING),
        Tag::Ctx(value) => Some(make_ctag_primitive(value)),
    };
    read_object_header(stream, min_length, expected, false, false, false)?.definite()
}

/// Read the header of a BIT STRING hole, consuming the unused-bits octet.
pub fn read_bitstring_hole(
    stream: &mut ReadStream<'_>, min_length: usize, tag: Tag,
) -> CryptResult<usize> {
    let expected = match tag {
        Tag::None | Tag::Default => Some(BER_BITSTRING),
        Tag::Ctx(value) => Some(make_ctag_primitive(value)),
    };
    read_object_header(stream, min_length, expected, false, true, false)?.definite()
}

/// Read the header of a generic hole.  `tag` of `None` accepts any
/// plausible hole tag.
pub fn read_generic_hole(
    stream: &mut ReadStream<'_>, min_length: usize, tag: Option<u8>,
) -> CryptResult<usize> {
    read_object_header(stream, min_length, tag, false, false, false)?.definite()
}

/// Read an abnormally-long SEQUENCE header, used where potentially huge
/// data quantities (CMS enveloped content) would fail the sanity limit of
/// the standard read.  Indefinite lengths are always allowed since they
/// are likely for large objects.
pub fn read_long_sequence(stream: &mut ReadStream<'_>) -> CryptResult<Length> {
    read_long_object_header(stream, 1, Some(BER_SEQUENCE), false)
}

/// Long-form SET header read.
pub fn read_long_set(stream: &mut ReadStream<'_>) -> CryptResult<Length> {
    read_long_object_header(stream, 1, Some(BER_SET), false)
}

/// Long-form constructed-object header read.
pub fn read_long_constructed(stream: &mut ReadStream<'_>, tag: Tag) -> CryptResult<Length> {
    read_long_object_header(stream, 1, constructed_tag(tag), false)
}

/// Long-form generic-hole header read; `tag` of `None` accepts any
/// plausible hole tag.
pub fn read_long_generic_hole(
    stream: &mut ReadStream<'_>, tag: Option<u8>,
) -> CryptResult<Length> {
    read_long_object_header(stream, 1, tag, false)
}

/// Read a generic object header to find the length of an object being
/// treated as a blob.
pub fn read_generic_object_header(
    stream: &mut ReadStream<'_>, is_long_object: bool,
) -> CryptResult<Length> {
    if is_long_object {
        read_long_object_header(stream, 1, None, true)
    } else {
        read_object_header(stream, 1, None, true, false, true)
    }
}

/* Self-delimited objects are read into allocated storage by grabbing the
   header from the first few bytes, sizing the allocation from the decoded
   length, and then validating the result as a complete encoding */

const OBJECT_HEADER_DATA_SIZE: usize = 16;

/// Read a complete self-delimited object into a heap buffer sized to the
/// decoded header, then independently validate the result with
/// [`crate::asn1_check::check_object_encoding`] so that objects that
/// decode partially or carry trailing garbage are rejected.
pub fn read_raw_object_alloc(
    stream: &mut ReadStream<'_>, min_length: usize, max_length: usize,
) -> CryptResult<Vec<u8>> {
    debug_assert!(min_length >= OBJECT_HEADER_DATA_SIZE && min_length < max_length
                  && max_length < MAX_INTLENGTH_SHORT);

    /* Find out how much data needs to be read.  The source may be
       non-seekable so the first few bytes are grabbed and decoded to see
       what follows */
    let mut buffer = [0u8; OBJECT_HEADER_DATA_SIZE];
    stream.read(&mut buffer)?;
    let mut header_stream = ReadStream::new(&buffer);
    let data_length =
        read_generic_hole(&mut header_stream, OBJECT_HEADER_DATA_SIZE, None)
            .map_err(|err| stream.set_error(err))?;
    let header_size = header_stream.tell();
    let object_length = header_size + data_length;

    /* Make sure that the object has a sensible length */
    if object_length < min_length || object_length > max_length {
        return Err(stream.set_error(CryptError::BadData));
    }

    /* Allocate storage for the object and copy the already-read header
       portion to its start */
    let mut object_data = vec![0u8; object_length];
    object_data[..OBJECT_HEADER_DATA_SIZE].copy_from_slice(&buffer);

    /* Read the remainder and check that the overall object is valid */
    if let Err(err) = stream.read(&mut object_data[OBJECT_HEADER_DATA_SIZE..]) {
        object_data.zeroize();
        return Err(err);
    }
    if let Err(err) = crate::asn1_check::check_object_encoding(&object_data) {
        object_data.zeroize();
        return Err(stream.set_error(err));
    }

    Ok(object_data)
}
