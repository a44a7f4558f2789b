//! ASN.1 codec round-trip and failure-property tests.

mod common;

use common::TestBignum;
use pkimech::asn1_check::check_object_encoding;
use pkimech::asn1_read::{self, Length, Tag};
use pkimech::asn1_write::{self, sizeof_bignum, sizeof_object};
use pkimech::bignum::Bignum;
use pkimech::stream::{ReadStream, WriteStream};
use pkimech::CryptError;
use rand::{Rng, RngCore};
use rand_chacha::rand_core::SeedableRng;

#[test]
fn test_boolean_round_trip() {
    for value in [false, true] {
        let mut buffer = [0u8; 8];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_boolean(&mut stream, value, Tag::Default).unwrap();
        let length = stream.tell();
        let mut stream = ReadStream::new(&buffer[..length]);
        assert_eq!(asn1_read::read_boolean(&mut stream).unwrap(), value);
        assert_eq!(stream.data_left(), 0);
    }
}

#[test]
fn test_short_integer_round_trip() {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(123);
    for _i in 0..100 {
        let value = i64::from(rng.gen_range(0..1_000_000u32));
        let mut buffer = [0u8; 16];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_short_integer(&mut stream, value, Tag::Default).unwrap();
        let length = stream.tell();
        let mut stream = ReadStream::new(&buffer[..length]);
        assert_eq!(asn1_read::read_short_integer(&mut stream).unwrap(), value);
    }
}

#[test]
fn test_integer_round_trip() {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(456);
    for _i in 0..100 {
        let length = rng.gen_range(1..=64usize);
        let mut value = vec![0u8; length];
        rng.fill_bytes(&mut value);
        value[0] |= 0x01; /* no leading zero, the canonical form */

        let mut buffer = [0u8; 80];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_integer(&mut stream, &value, Tag::Default).unwrap();
        let written = stream.tell();

        let mut read_back = [0u8; 80];
        let mut stream = ReadStream::new(&buffer[..written]);
        let read_length = asn1_read::read_integer(&mut stream, Some(&mut read_back)).unwrap();
        assert_eq!(&read_back[..read_length], &value[..]);
    }
}

#[test]
fn test_bignum_round_trip() {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(789);
    for _i in 0..100 {
        let length = rng.gen_range(16..=256usize);
        let mut value = vec![0u8; length];
        rng.fill_bytes(&mut value);
        value[0] |= 0x80; /* force the sign-padding path */
        let bignum = TestBignum::from_be_bytes(&value);

        let mut buffer = vec![0u8; sizeof_bignum(&bignum)];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_bignum(&mut stream, &bignum).unwrap();
        assert_eq!(stream.tell(), buffer.len());

        let mut decoded = TestBignum::new();
        let mut stream = ReadStream::new(&buffer);
        asn1_read::read_bignum(&mut stream, &mut decoded, 1, 512, None).unwrap();
        assert_eq!(decoded.0, bignum.0);
    }
}

#[test]
fn test_bignum_size_policy() {
    // A 96-byte value read with checked bounds reports NoSecure, with
    // plain bounds BadData
    let value = vec![0x80u8; 96];
    let mut buffer = vec![0u8; 128];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_integer(&mut stream, &value, Tag::Default).unwrap();
    let written = stream.tell();

    let mut decoded = TestBignum::new();
    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(
        asn1_read::read_bignum_checked(&mut stream, &mut decoded, 128, 512, None),
        Err(CryptError::NoSecure)
    );
    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(
        asn1_read::read_bignum(&mut stream, &mut decoded, 128, 512, None),
        Err(CryptError::BadData)
    );
}

#[test]
fn test_octet_string_round_trip() {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(321);
    for _i in 0..100 {
        let length = rng.gen_range(1..=200usize);
        let mut value = vec![0u8; length];
        rng.fill_bytes(&mut value);

        let mut buffer = vec![0u8; sizeof_object(length)];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_octet_string(&mut stream, &value, Tag::Default).unwrap();
        assert_eq!(stream.tell(), buffer.len());

        let mut read_back = vec![0u8; 256];
        let mut stream = ReadStream::new(&buffer);
        let read_length = asn1_read::read_octet_string(&mut stream, Some(&mut read_back),
                                                       1, 256).unwrap();
        assert_eq!(&read_back[..read_length], &value[..]);
    }
}

#[test]
fn test_character_string_truncation() {
    // Over-long character strings are truncated rather than rejected,
    // because certificates in the wild over-run their declared limits
    let value = [b'x'; 40];
    let mut buffer = [0u8; 64];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_character_string(&mut stream, &value,
                                       asn1_read::BER_STRING_PRINTABLE).unwrap();
    let written = stream.tell();

    let mut read_back = [0u8; 64];
    let mut stream = ReadStream::new(&buffer[..written]);
    let read_length = asn1_read::read_character_string(
        &mut stream, Some(&mut read_back), 16, asn1_read::BER_STRING_PRINTABLE,
    ).unwrap();
    assert_eq!(read_length, 16);
    assert_eq!(&read_back[..16], &value[..16]);
    // The stream is positioned past the full string
    assert_eq!(stream.data_left(), 0);
}

#[test]
fn test_enumerated_and_bitstring_round_trip() {
    for value in [0i32, 1, 17, 999] {
        let mut buffer = [0u8; 8];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_enumerated(&mut stream, value, Tag::Default).unwrap();
        let written = stream.tell();
        let mut stream = ReadStream::new(&buffer[..written]);
        assert_eq!(asn1_read::read_enumerated(&mut stream).unwrap(), value);
    }

    for flags in [0u32, 0b1, 0b100, 0b1100_0101, 0xFFFF] {
        let mut buffer = [0u8; 16];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_bitstring(&mut stream, flags, Tag::Default).unwrap();
        let written = stream.tell();
        let mut stream = ReadStream::new(&buffer[..written]);
        assert_eq!(asn1_read::read_bitstring(&mut stream).unwrap(), flags);
    }
}

#[test]
fn test_time_round_trip() {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(654);
    for _i in 0..100 {
        // Times in 1996..2049, expressible as both UTCTime and
        // GeneralizedTime
        let time = i64::from(rng.gen_range(850_000_000..2_400_000_000u32));

        let mut buffer = [0u8; 32];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_utc_time(&mut stream, time, Tag::Default).unwrap();
        let written = stream.tell();
        let mut stream = ReadStream::new(&buffer[..written]);
        assert_eq!(asn1_read::read_utc_time(&mut stream).unwrap(), time);

        let mut buffer = [0u8; 32];
        let mut stream = WriteStream::new(&mut buffer);
        asn1_write::write_generalized_time(&mut stream, time, Tag::Default).unwrap();
        let written = stream.tell();
        let mut stream = ReadStream::new(&buffer[..written]);
        assert_eq!(asn1_read::read_generalized_time(&mut stream).unwrap(), time);
    }
}

#[test]
fn test_tagged_values_round_trip() {
    // Implicitly-tagged primitives keep their context tag through the
    // round trip
    let mut buffer = [0u8; 32];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_short_integer(&mut stream, 42, Tag::Ctx(3)).unwrap();
    asn1_write::write_octet_string(&mut stream, b"data", Tag::Ctx(5)).unwrap();
    let written = stream.tell();

    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_short_integer_tag(&mut stream, Tag::Ctx(3)).unwrap(), 42);
    let mut read_back = [0u8; 8];
    let length = asn1_read::read_octet_string_tag(&mut stream, Some(&mut read_back), 1, 8,
                                                  Tag::Ctx(5)).unwrap();
    assert_eq!(&read_back[..length], b"data");

    // A mismatched tag is rejected
    let mut stream = ReadStream::new(&buffer[..written]);
    assert!(asn1_read::read_short_integer_tag(&mut stream, Tag::Ctx(4)).is_err());
}

#[test]
fn test_constructed_nesting_round_trip() {
    // SEQUENCE { [0] { INTEGER 5 }, SET { NULL } }
    let inner0 = sizeof_object(1); // INTEGER 5
    let set_content = sizeof_object(0); // NULL
    let seq_content = sizeof_object(inner0) + sizeof_object(set_content);

    let mut buffer = [0u8; 32];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_sequence(&mut stream, seq_content).unwrap();
    asn1_write::write_constructed(&mut stream, inner0, Tag::Ctx(0)).unwrap();
    asn1_write::write_short_integer(&mut stream, 5, Tag::Default).unwrap();
    asn1_write::write_set(&mut stream, set_content).unwrap();
    asn1_write::write_null(&mut stream, Tag::Default).unwrap();
    let written = stream.tell();

    check_object_encoding(&buffer[..written]).unwrap();

    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_sequence(&mut stream).unwrap(), seq_content);
    assert_eq!(asn1_read::read_constructed(&mut stream, Tag::Ctx(0)).unwrap(), inner0);
    assert_eq!(asn1_read::read_short_integer(&mut stream).unwrap(), 5);
    assert_eq!(asn1_read::read_set(&mut stream).unwrap(), set_content);
    asn1_read::read_null(&mut stream).unwrap();
    assert_eq!(stream.data_left(), 0);
}

#[test]
fn test_holes() {
    // OCTET STRING hole: header consumed, content (an encoded INTEGER)
    // left on the stream for recursive parsing
    let mut buffer = [0u8; 32];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_octet_string_hole(&mut stream, 3, Tag::Default).unwrap();
    asn1_write::write_short_integer(&mut stream, 7, Tag::Default).unwrap();
    let written = stream.tell();

    check_object_encoding(&buffer[..written]).unwrap();
    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_octet_string_hole(&mut stream, 1, Tag::Default).unwrap(), 3);
    assert_eq!(asn1_read::read_short_integer(&mut stream).unwrap(), 7);

    // BIT STRING hole: the unused-bits octet is part of the header
    let mut buffer = [0u8; 32];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_bitstring_hole(&mut stream, 3, Tag::Default).unwrap();
    asn1_write::write_short_integer(&mut stream, 9, Tag::Default).unwrap();
    let written = stream.tell();

    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_bitstring_hole(&mut stream, 1, Tag::Default).unwrap(), 3);
    assert_eq!(asn1_read::read_short_integer(&mut stream).unwrap(), 9);

    // Generic hole with an any-tag read
    let mut stream = ReadStream::new(&buffer[..written]);
    let length = asn1_read::read_generic_hole(&mut stream, 1, None).unwrap();
    assert_eq!(length, 4); // bit-string content includes the unused count
}

#[test]
fn test_long_form_headers() {
    // A SEQUENCE bigger than the short-form sanity limit is readable
    // through the long-form API
    let content_length = 40_000usize;
    let mut buffer = vec![0u8; content_length + 8];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_sequence(&mut stream, content_length).unwrap();
    let header = stream.tell();

    let mut stream = ReadStream::new(&buffer[..header + content_length]);
    assert_eq!(asn1_read::read_long_sequence(&mut stream).unwrap(),
               Length::Definite(content_length));

    // The short-form read rejects it
    let mut stream = ReadStream::new(&buffer[..header + content_length]);
    assert!(asn1_read::read_sequence(&mut stream).is_err());
}

#[test]
fn test_truncation_never_succeeds() {
    // Truncating a valid object at any point must error, never succeed
    let mut buffer = [0u8; 64];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_sequence(&mut stream, sizeof_object(20)).unwrap();
    asn1_write::write_octet_string(&mut stream, &[0x5A; 20], Tag::Default).unwrap();
    let written = stream.tell();

    for cut in 0..written {
        let mut stream = ReadStream::new(&buffer[..cut]);
        let result = asn1_read::read_sequence(&mut stream).and_then(|_| {
            let mut out = [0u8; 32];
            asn1_read::read_octet_string(&mut stream, Some(&mut out), 1, 32)
        });
        match result {
            Err(CryptError::BadData | CryptError::Underflow) => {}
            other => panic!("truncation at {cut} produced {other:?}"),
        }
    }
}

#[test]
fn test_raw_object_alloc_rejects_extension() {
    // Extending an object with trailing bytes inside the allocation
    // context produces bad data via the whole-encoding check
    let mut object = vec![0x30, 30, 0x04, 28];
    object.extend(std::iter::repeat(0x41).take(28));

    let mut stream = ReadStream::new(&object);
    let read = asn1_read::read_raw_object_alloc(&mut stream, 16, 64).unwrap();
    assert_eq!(read, object);

    // Grow the outer header so it covers a trailing garbage byte
    let mut extended = object.clone();
    extended[1] += 1;
    extended.push(0xFF);
    let mut stream = ReadStream::new(&extended);
    assert_eq!(asn1_read::read_raw_object_alloc(&mut stream, 16, 64),
               Err(CryptError::BadData));
}

#[test]
fn test_indefinite_length_walk() {
    // SEQUENCE (indefinite) { NULL, SEQUENCE (indefinite) { NULL } EOC } EOC
    let data = [0x30, 0x80, 0x05, 0x00, 0x30, 0x80, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];
    check_object_encoding(&data).unwrap();

    let mut stream = ReadStream::new(&data);
    assert_eq!(asn1_read::read_sequence_indef(&mut stream).unwrap(), Length::Indefinite);
    assert!(!asn1_read::check_eoc(&mut stream).unwrap());
    asn1_read::read_null(&mut stream).unwrap();
    assert_eq!(asn1_read::read_sequence_indef(&mut stream).unwrap(), Length::Indefinite);
    asn1_read::read_null(&mut stream).unwrap();
    assert!(asn1_read::check_eoc(&mut stream).unwrap());
    assert!(asn1_read::check_eoc(&mut stream).unwrap());
    assert_eq!(stream.data_left(), 0);
}

#[test]
fn test_universal_skip() {
    let mut buffer = [0u8; 32];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_octet_string(&mut stream, &[1, 2, 3], Tag::Default).unwrap();
    asn1_write::write_short_integer(&mut stream, 11, Tag::Default).unwrap();
    let written = stream.tell();

    let mut stream = ReadStream::new(&buffer[..written]);
    asn1_read::read_universal(&mut stream).unwrap();
    assert_eq!(asn1_read::read_short_integer(&mut stream).unwrap(), 11);
}

#[test]
fn test_fixed_and_encoded_oid() {
    const SHA256_OID: &[u8] =
        &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

    let mut stream = ReadStream::new(SHA256_OID);
    asn1_read::read_fixed_oid(&mut stream, SHA256_OID).unwrap();
    assert_eq!(stream.data_left(), 0);

    // The raw form comes back byte-exact, header included
    let mut oid = [0u8; 32];
    let mut stream = ReadStream::new(SHA256_OID);
    let length = asn1_read::read_encoded_oid(
        &mut stream, &mut oid, Some(asn1_read::BER_OBJECT_IDENTIFIER),
    ).unwrap();
    assert_eq!(&oid[..length], SHA256_OID);

    // A different OID fails the fixed match
    let mut wrong = SHA256_OID.to_vec();
    *wrong.last_mut().unwrap() = 0x02;
    let mut stream = ReadStream::new(&wrong);
    assert!(asn1_read::read_fixed_oid(&mut stream, SHA256_OID).is_err());
}

#[test]
fn test_long_form_variants() {
    // SET, tagged constructed and generic holes through the long-form API
    let mut buffer = vec![0u8; 64];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_set(&mut stream, 2).unwrap();
    asn1_write::write_null(&mut stream, Tag::Default).unwrap();
    asn1_write::write_constructed(&mut stream, 2, Tag::Ctx(1)).unwrap();
    asn1_write::write_null(&mut stream, Tag::Default).unwrap();
    asn1_write::write_generic_hole(&mut stream, 2, asn1_read::make_ctag(2)).unwrap();
    asn1_write::write_null(&mut stream, Tag::Default).unwrap();
    let written = stream.tell();

    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_long_set(&mut stream).unwrap(), Length::Definite(2));
    asn1_read::read_null(&mut stream).unwrap();
    assert_eq!(asn1_read::read_long_constructed(&mut stream, Tag::Ctx(1)).unwrap(),
               Length::Definite(2));
    asn1_read::read_null(&mut stream).unwrap();
    assert_eq!(
        asn1_read::read_long_generic_hole(&mut stream, Some(asn1_read::make_ctag(2)))
            .unwrap(),
        Length::Definite(2)
    );
    asn1_read::read_null(&mut stream).unwrap();
    assert_eq!(stream.data_left(), 0);

    // A generic object header treated as a blob reports the same length
    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_generic_object_header(&mut stream, false).unwrap(),
               Length::Definite(2));
    let mut stream = ReadStream::new(&buffer[..written]);
    assert_eq!(asn1_read::read_generic_object_header(&mut stream, true).unwrap(),
               Length::Definite(2));
}

#[test]
fn test_null_stream_bignum_prediction() {
    // A dummy write of a bignum through a null stream predicts the real
    // encoded size without exporting any key data
    let bignum = TestBignum::from_be_bytes(&[0x80; 128]);
    let mut counter = WriteStream::null();
    asn1_write::write_bignum(&mut counter, &bignum).unwrap();
    assert_eq!(counter.tell(), sizeof_bignum(&bignum));

    let mut buffer = vec![0u8; counter.tell()];
    let mut stream = WriteStream::new(&mut buffer);
    asn1_write::write_bignum(&mut stream, &bignum).unwrap();
    assert_eq!(stream.tell(), counter.tell());
}
