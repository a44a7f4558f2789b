#![no_main]

// Drives the two codecs' read paths over raw fuzz input.  Every reader
// must fail cleanly (a status return, never a panic or hang) on
// arbitrary data, and anything that reads back what it wrote must
// round-trip.

use libfuzzer_sys::fuzz_target;
use pkimech::asn1_check::check_object_encoding;
use pkimech::asn1_read::{self, Tag};
use pkimech::bignum::RawBignum;
use pkimech::stream::ReadStream;
use pkimech::wire;

fuzz_target!(|data: &[u8]| {
    // ASN.1 primitive readers, each from the start of the input
    let mut out = [0u8; 512];
    let _ = asn1_read::read_integer(&mut ReadStream::new(data), Some(&mut out));
    let _ = asn1_read::read_short_integer(&mut ReadStream::new(data));
    let _ = asn1_read::read_enumerated(&mut ReadStream::new(data));
    let _ = asn1_read::read_boolean(&mut ReadStream::new(data));
    let _ = asn1_read::read_null(&mut ReadStream::new(data));
    let _ = asn1_read::read_octet_string(&mut ReadStream::new(data), Some(&mut out), 1, 512);
    let _ = asn1_read::read_bitstring(&mut ReadStream::new(data));
    let _ = asn1_read::read_utc_time(&mut ReadStream::new(data));
    let _ = asn1_read::read_generalized_time(&mut ReadStream::new(data));
    let _ = asn1_read::read_sequence_indef(&mut ReadStream::new(data));
    let _ = asn1_read::read_generic_hole(&mut ReadStream::new(data), 1, None);
    let _ = asn1_read::read_raw_object_alloc(&mut ReadStream::new(data), 16, 16384);

    let mut bignum = RawBignum::new();
    let _ = asn1_read::read_bignum(&mut ReadStream::new(data), &mut bignum, 1, 512, None);
    let _ = asn1_read::read_bignum_checked(&mut ReadStream::new(data), &mut bignum, 128,
                                           512, None);

    // The whole-encoding validator over the raw input
    let _ = check_object_encoding(data);

    // Length-prefixed readers
    let _ = wire::read_uint16(&mut ReadStream::new(data));
    let _ = wire::read_uint32(&mut ReadStream::new(data));
    let _ = wire::read_uint32_time(&mut ReadStream::new(data));
    let _ = wire::read_string32(&mut ReadStream::new(data), &mut out);
    let _ = wire::read_raw_object32(&mut ReadStream::new(data), &mut out);
    let _ = wire::read_integer16u(&mut ReadStream::new(data), Some(&mut out), 1, 512);
    let _ = wire::read_integer16u_bits(&mut ReadStream::new(data), Some(&mut out), 1, 512);
    let _ = wire::read_integer32(&mut ReadStream::new(data), Some(&mut out), 1, 512);
    let _ = wire::read_integer32_checked(&mut ReadStream::new(data), Some(&mut out), 128,
                                         512);
    let _ = wire::read_bignum_integer16u(&mut ReadStream::new(data), &mut bignum, 1, 512,
                                         None);

    // A stream that survives a full tagged read must describe a
    // self-consistent object
    let mut stream = ReadStream::new(data);
    if let Ok(length) = asn1_read::read_constructed_indef(&mut stream, Tag::Default) {
        if let asn1_read::Length::Definite(length) = length {
            let header = stream.tell();
            if header + length <= data.len() {
                let _ = check_object_encoding(&data[..header + length]);
            }
        }
    }
});
