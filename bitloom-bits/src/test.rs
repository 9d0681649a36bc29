use crate::{
    bytes_to_uint, decode_uint, encode_uint, invert_uint, reverse_bytes, reverse_uint,
    uint_to_bytes, BitBuf, Encoding, Whence,
};
use bitloom_base::{ErrorKind, Value};
use test_log::test;

#[test]
fn test_reverse_invert_uint() {
    assert_eq!(reverse_uint(0b011, 8).unwrap(), 0b11000000);
    assert_eq!(reverse_uint(0b10110010, 8).unwrap(), 0b01001101);
    assert_eq!(invert_uint(0, 3).unwrap(), 0b111);
    assert_eq!(invert_uint(0b1100, 4).unwrap(), 0b0011);
    assert!(reverse_uint(0b100, 2).is_err());
}

#[test]
fn test_reverse_bytes() {
    assert_eq!(reverse_bytes(&[0x01, 0x02]), vec![0x40, 0x80]);
    let b = vec![0xa5, 0x3c, 0x7e];
    assert_eq!(reverse_bytes(&reverse_bytes(&b)), b);
}

#[test]
fn test_bytes_to_uint_hello() {
    let (v, n) = bytes_to_uint(b"hello world", 0, 0, false, false).unwrap();
    assert_eq!(v, 126207244316550804821666916);
    assert_eq!(n, 88);
    let out = uint_to_bytes(v, 88, 0, 0, 0, false, false).unwrap();
    assert_eq!(out, b"hello world");
}

#[test]
fn test_bytes_uint_inverse() {
    // Inverse law across offsets, reversal and inversion.
    let data = [0b1011_0110, 0b0101_1001, 0b1110_0010];
    for lstrip in 0..8u64 {
        for rstrip in 0..8u64 {
            for (rev, inv) in [(false, false), (true, false), (false, true), (true, true)] {
                let (v, n) = bytes_to_uint(&data, lstrip, rstrip, rev, inv).unwrap();
                assert_eq!(n, 24 - lstrip - rstrip);
                let out =
                    uint_to_bytes(v, n, lstrip, data[0], data[2], rev, inv).unwrap();
                assert_eq!(out, data, "lstrip={} rstrip={}", lstrip, rstrip);
            }
        }
    }
}

#[test]
fn test_read_forward() {
    let mut b = BitBuf::new(b"hello world".to_vec());
    assert_eq!(b.read(8).unwrap(), (104, 8));
    assert_eq!(b.tell(), 8);
    b.seek(-4, Whence::Cur).unwrap();
    assert_eq!(b.tell(), 4);
    // Low nibble of 'h' = 0x68.
    assert_eq!(b.read(4).unwrap(), (0x8, 4));
}

#[test]
fn test_read_backward() {
    let mut b = BitBuf::new(vec![0b1101_0010]);
    b.seek(8, Whence::Set).unwrap();
    // Reading -8 yields the byte bit-reversed and leaves the cursor at 0.
    assert_eq!(b.read(-8).unwrap(), (0b0100_1011, 8));
    assert_eq!(b.tell(), 0);
}

#[test]
fn test_peek_and_seek_whence() {
    let mut b = BitBuf::new(vec![0x12, 0x34]);
    assert_eq!(b.peek(8).unwrap(), (0x12, 8));
    assert_eq!(b.tell(), 0);
    assert_eq!(b.seek(-4, Whence::End).unwrap(), 12);
    assert_eq!(b.read(4).unwrap(), (0x4, 4));
    assert!(b.seek(-1, Whence::Set).is_err());
}

#[test]
fn test_read_short() {
    let mut b = BitBuf::new(vec![0xff]);
    b.seek(4, Whence::Set).unwrap();
    let (v, n) = b.read(8).unwrap();
    assert_eq!((v, n), (0xf, 4));
}

#[test]
fn test_write_preserves_surroundings() {
    let mut b = BitBuf::new(vec![b'h']);
    b.seek(4, Whence::Set).unwrap();
    b.write(0, 1).unwrap();
    assert_eq!(b.as_bytes(), b"`");

    let mut b = BitBuf::new(vec![0xff, 0xff]);
    b.seek(3, Whence::Set).unwrap();
    b.write(0, 7).unwrap();
    assert_eq!(b.as_bytes(), &[0b1110_0000, 0b0011_1111]);
}

#[test]
fn test_write_extends() {
    let mut b = BitBuf::empty();
    b.write(0b101, 3).unwrap();
    b.write(0x7f, 9).unwrap();
    assert_eq!(b.bit_len(), 16);
    assert_eq!(b.as_bytes(), &[0b1010_0111, 0b1111_0000]);
}

#[test]
fn test_write_backward() {
    let mut b = BitBuf::new(vec![0x00]);
    b.seek(8, Whence::Set).unwrap();
    b.write(0b0000_0001, -8).unwrap();
    assert_eq!(b.as_bytes(), &[0b1000_0000]);
    assert_eq!(b.tell(), 0);
}

#[test]
fn test_reverse_involution() {
    let mut b = BitBuf::new(vec![0x12, 0x34, 0x56]);
    b.seek(5, Whence::Set).unwrap();
    let before = b.as_bytes().to_vec();
    b.reverse(Some(13)).unwrap();
    assert_eq!(b.tell(), 5);
    b.reverse(Some(13)).unwrap();
    assert_eq!(b.as_bytes(), &before[..]);
}

#[test]
fn test_invert_involution() {
    let mut b = BitBuf::new(vec![0x12, 0x34, 0x56]);
    b.seek(3, Whence::Set).unwrap();
    let before = b.as_bytes().to_vec();
    b.invert(None).unwrap();
    b.invert(None).unwrap();
    assert_eq!(b.as_bytes(), &before[..]);
}

#[test]
fn test_reverse_aligned() {
    let mut b = BitBuf::new(vec![0x01, 0x02]);
    b.reverse(None).unwrap();
    assert_eq!(b.as_bytes(), &[0x40, 0x80]);
}

#[test]
fn test_find() {
    let mut b = BitBuf::new(b"abcdefg".to_vec());
    b.seek(8, Whence::Set).unwrap();
    assert_eq!(b.find(b"cd").unwrap(), Some(8));
    assert_eq!(b.find(b"zz").unwrap(), None);
    b.seek(1, Whence::Cur).unwrap();
    assert_eq!(b.find(b"cd").unwrap_err().kind(), ErrorKind::Alignment);
}

#[test]
fn test_read_write_bytes_triple() {
    let mut b = BitBuf::new(vec![0xab, 0xcd, 0xef]);
    b.seek(4, Whence::Set).unwrap();
    let (tail, width, rest) = b.read_bytes().unwrap();
    assert_eq!((tail, width), (0xb, 4));
    assert_eq!(rest, vec![0xcd, 0xef]);
    assert!(b.at_eof());

    let mut out = BitBuf::empty();
    out.write(0xa, 4).unwrap();
    out.write_bytes(tail, width, &rest).unwrap();
    assert_eq!(out.as_bytes(), &[0xab, 0xcd, 0xef]);
}

#[test]
fn test_truncate() {
    let mut b = BitBuf::new(vec![0xff, 0xff, 0xff]);
    b.truncate(12).unwrap();
    assert_eq!(b.as_bytes(), &[0xff, 0xf0]);
}

#[test]
fn test_codec_uint_sint() {
    assert_eq!(decode_uint(5, 16, Encoding::UInt).unwrap(), Value::UInt(5));
    assert_eq!(decode_uint(63, 6, Encoding::SInt).unwrap(), Value::SInt(-1));
    assert_eq!(encode_uint(&Value::SInt(-1), 6, Encoding::SInt).unwrap(), 63);
    assert_eq!(encode_uint(&Value::SInt(-1), 128, Encoding::SInt).unwrap(), u128::MAX);
    assert!(encode_uint(&Value::UInt(256), 8, Encoding::UInt).is_err());

    // Wide signed tokens stay clear of shift overflow.
    let all_ones_127 = u128::MAX >> 1;
    assert_eq!(decode_uint(all_ones_127, 127, Encoding::SInt).unwrap(), Value::SInt(-1));
    assert_eq!(encode_uint(&Value::SInt(-1), 127, Encoding::SInt).unwrap(), all_ones_127);
}

#[test]
fn test_codec_floats() {
    let pi = std::f64::consts::PI;
    let enc = encode_uint(&Value::f64(pi), 64, Encoding::F64).unwrap();
    assert_eq!(enc, 0x400921fb54442d18);
    assert_eq!(decode_uint(enc, 64, Encoding::F64).unwrap(), Value::f64(pi));

    let enc = encode_uint(&Value::f32(std::f32::consts::PI), 32, Encoding::F32).unwrap();
    assert_eq!(enc, 0x40490fdb);
}

#[test]
fn test_codec_strings() {
    assert_eq!(
        decode_uint(0x1234, 16, Encoding::HexLower).unwrap(),
        Value::Hex("1234".into(), bitloom_base::HexCase::Lower)
    );
    // Width that is not a nibble multiple still renders a fixed digit count.
    assert_eq!(
        decode_uint(0x1f, 5, Encoding::HexLower).unwrap(),
        Value::Hex("1f".into(), bitloom_base::HexCase::Lower)
    );
    assert_eq!(decode_uint(5, 6, Encoding::Bin).unwrap(), Value::Bin("000101".into()));
    assert_eq!(encode_uint(&Value::Bin("000101".into()), 6, Encoding::Bin).unwrap(), 5);
    assert_eq!(
        decode_uint(0x4142, 16, Encoding::Bytes).unwrap(),
        Value::Bytes(b"AB".to_vec())
    );
    assert_eq!(
        encode_uint(&Value::Bytes(b"AB".to_vec()), 16, Encoding::Bytes).unwrap(),
        0x4142
    );
}
