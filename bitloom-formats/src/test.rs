use crate::zip::{zip_archive, ZipEntry};
use crate::{
    from_b32, from_b64, from_bin, from_hex, from_oct, to_b32, to_b64, to_bin, to_hex,
    to_hex_upper, to_oct,
};
use bitloom_maker::{construct_byte_stream, extract};
use test_log::test;

#[test]
fn test_b64() {
    assert_eq!(to_b64(b"hello world"), b"aGVsbG8gd29ybGQ=");
    assert_eq!(from_b64(b"aGVsbG8gd29ybGQ=").unwrap(), b"hello world");
    assert!(from_b64(b"abc").is_err());
    assert!(from_b64(b"a=bc").is_err());
}

#[test]
fn test_b32() {
    assert_eq!(to_b32(b"hello world"), b"NBSWY3DPEB3W64TMMQ======");
    assert_eq!(from_b32(b"NBSWY3DPEB3W64TMMQ======").unwrap(), b"hello world");
}

#[test]
fn test_hex() {
    assert_eq!(to_hex(b"hello world"), "68656c6c6f20776f726c64");
    assert_eq!(to_hex_upper(b"\xde\xad"), "DEAD");
    assert_eq!(from_hex("68656C6C6F20776F726C64").unwrap(), b"hello world");
    assert!(from_hex("zz").is_err());
}

#[test]
fn test_oct() {
    assert_eq!(to_oct(b"hello world"), b"320625543306744035667562330620==");
    assert_eq!(
        from_oct(b"320625543306744035667562330620==").unwrap(),
        b"hello world"
    );
}

#[test]
fn test_bin() {
    assert_eq!(to_bin(b"\xa5"), b"10100101");
    assert_eq!(from_bin(b"10100101").unwrap(), b"\xa5");
    // A trailing partial byte stays, left-justified.
    assert_eq!(from_bin(b"101").unwrap(), b"\xa0");
}

#[test]
fn test_codec_round_trips() {
    let data: Vec<u8> = (0..=255).collect();
    assert_eq!(from_b64(&to_b64(&data)).unwrap(), data);
    assert_eq!(from_b32(&to_b32(&data)).unwrap(), data);
    assert_eq!(from_oct(&to_oct(&data)).unwrap(), data);
    assert_eq!(from_bin(&to_bin(&data)).unwrap(), data);
    assert_eq!(from_hex(&to_hex(&data)).unwrap(), data);
}

/// A minimal stored-entry archive: one local entry, one central directory
/// entry, the EOCD record.
fn sample_zip() -> Vec<u8> {
    let mut z = Vec::new();
    // Local file header for "hi.txt" containing "hi", stored.
    z.extend_from_slice(b"PK\x03\x04");
    z.extend_from_slice(&[0x14, 0x00]); // version needed
    z.extend_from_slice(&[0x00, 0x00]); // flags
    z.extend_from_slice(&[0x00, 0x00]); // method: stored
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // time, date
    z.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]); // crc32
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // compressed size
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // uncompressed size
    z.extend_from_slice(&[0x06, 0x00]); // name length
    z.extend_from_slice(&[0x00, 0x00]); // extra length
    z.extend_from_slice(b"hi.txt");
    z.extend_from_slice(b"hi");
    assert_eq!(z.len(), 38);

    // Central directory entry.
    z.extend_from_slice(b"PK\x01\x02");
    z.extend_from_slice(&[0x14, 0x00, 0x14, 0x00]); // version made by / needed
    z.extend_from_slice(&[0x00, 0x00]); // flags
    z.extend_from_slice(&[0x00, 0x00]); // method
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // time, date
    z.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]); // crc32
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // compressed size
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // uncompressed size
    z.extend_from_slice(&[0x06, 0x00]); // name length
    z.extend_from_slice(&[0x00, 0x00]); // extra length
    z.extend_from_slice(&[0x00, 0x00]); // comment length
    z.extend_from_slice(&[0x00, 0x00]); // disk number start
    z.extend_from_slice(&[0x00, 0x00]); // internal attributes
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // external attributes
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // local header offset
    z.extend_from_slice(b"hi.txt");
    assert_eq!(z.len(), 38 + 52);

    // End of central directory.
    z.extend_from_slice(b"PK\x05\x06");
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // disk numbers
    z.extend_from_slice(&[0x01, 0x00, 0x01, 0x00]); // entry counts
    z.extend_from_slice(&[0x34, 0x00, 0x00, 0x00]); // central directory size
    z.extend_from_slice(&[0x26, 0x00, 0x00, 0x00]); // central directory offset
    z.extend_from_slice(&[0x00, 0x00]); // comment length
    assert_eq!(z.len(), 112);
    z
}

/// One streamed entry: zeroed sizes in the local header, flag bit 3 set,
/// the real sizes trailing the payload in a signed data descriptor.
fn sample_zip_with_descriptor() -> Vec<u8> {
    let mut z = Vec::new();
    // Local file header for "go.txt" containing "go", stored, streamed.
    z.extend_from_slice(b"PK\x03\x04");
    z.extend_from_slice(&[0x14, 0x00]); // version needed
    z.extend_from_slice(&[0x08, 0x00]); // flags: sizes follow in a descriptor
    z.extend_from_slice(&[0x00, 0x00]); // method: stored
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // time, date
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // crc32: deferred
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // compressed size: deferred
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // uncompressed size: deferred
    z.extend_from_slice(&[0x06, 0x00]); // name length
    z.extend_from_slice(&[0x00, 0x00]); // extra length
    z.extend_from_slice(b"go.txt");
    z.extend_from_slice(b"go");
    // Data descriptor, signed form.
    z.extend_from_slice(b"PK\x07\x08");
    z.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]); // crc32
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // compressed size
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // uncompressed size
    assert_eq!(z.len(), 54);

    // Central directory entry, carrying the real sizes.
    z.extend_from_slice(b"PK\x01\x02");
    z.extend_from_slice(&[0x14, 0x00, 0x14, 0x00]); // version made by / needed
    z.extend_from_slice(&[0x08, 0x00]); // flags
    z.extend_from_slice(&[0x00, 0x00]); // method
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // time, date
    z.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]); // crc32
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // compressed size
    z.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]); // uncompressed size
    z.extend_from_slice(&[0x06, 0x00]); // name length
    z.extend_from_slice(&[0x00, 0x00]); // extra length
    z.extend_from_slice(&[0x00, 0x00]); // comment length
    z.extend_from_slice(&[0x00, 0x00]); // disk number start
    z.extend_from_slice(&[0x00, 0x00]); // internal attributes
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // external attributes
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // local header offset
    z.extend_from_slice(b"go.txt");
    assert_eq!(z.len(), 54 + 52);

    // End of central directory.
    z.extend_from_slice(b"PK\x05\x06");
    z.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // disk numbers
    z.extend_from_slice(&[0x01, 0x00, 0x01, 0x00]); // entry counts
    z.extend_from_slice(&[0x34, 0x00, 0x00, 0x00]); // central directory size
    z.extend_from_slice(&[0x36, 0x00, 0x00, 0x00]); // central directory offset
    z.extend_from_slice(&[0x00, 0x00]); // comment length
    assert_eq!(z.len(), 128);
    z
}

#[test]
fn test_zip_extract() {
    let (_, entries) = extract(zip_archive, sample_zip()).unwrap();
    assert_eq!(
        entries,
        vec![ZipEntry {
            name: b"hi.txt".to_vec(),
            method: 0,
            crc32: 0x44332211,
            compressed_size: 2,
            uncompressed_size: 2,
            local_header_offset: 0,
        }]
    );
}

#[test]
fn test_zip_round_trip() {
    let data = sample_zip();
    let (maker, _) = extract(zip_archive, data.clone()).unwrap();
    let tree = maker.into_data_tree();
    let rebuilt = construct_byte_stream(zip_archive, &tree).unwrap();
    assert_eq!(rebuilt, data);
}

#[test]
fn test_zip_data_descriptor() {
    let data = sample_zip_with_descriptor();
    let (maker, entries) = extract(zip_archive, data.clone()).unwrap();
    assert_eq!(
        entries,
        vec![ZipEntry {
            name: b"go.txt".to_vec(),
            method: 0,
            crc32: 0x44332211,
            compressed_size: 2,
            uncompressed_size: 2,
            local_header_offset: 0,
        }]
    );
    let tree = maker.into_data_tree();
    assert_eq!(construct_byte_stream(zip_archive, &tree).unwrap(), data);
}

#[test]
fn test_zip_descriptor_without_signature() {
    // Drop the 4-byte signature from the descriptor and fix up the central
    // directory offset; the size reconciliation picks the 12-byte form.
    let mut data = sample_zip_with_descriptor();
    data.drain(38..42);
    data[118] = 0x32; // central directory offset: 54 -> 50
    let (_, entries) = extract(zip_archive, data).unwrap();
    assert_eq!(entries[0].compressed_size, 2);
}

#[test]
fn test_zip_descriptor_size_mismatch_rejected() {
    // Shrinking the central directory's compressed size leaves a 17-byte
    // gap to the next region, which is neither descriptor form; the size
    // reconciliation rejects the entry instead of desyncing.
    let mut data = sample_zip_with_descriptor();
    data[74] = 0x01; // central directory compressed size: 2 -> 1
    assert!(extract(zip_archive, data).is_err());
}
