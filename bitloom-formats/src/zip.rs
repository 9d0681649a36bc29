//! A structural ZIP blueprint: end-of-central-directory scan, central
//! directory walk, then each local file entry, including streamed entries
//! whose sizes arrive in a data descriptor after the payload. The same
//! function drives both extraction and reconstruction; payloads are kept as
//! raw (possibly compressed) bytes, and no checksums are computed (a
//! descriptor's fields are only required to agree with the central
//! directory).
//!
//! ZIP stores its multi-byte fields little-endian, so the blueprint runs
//! with the endian-swap-all setting on and spells marker/signature literals
//! in swapped order.

use bitloom_base::{err, Node, Result, Value};
use bitloom_maker::Maker;

/// What the blueprint learns about one archived file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: Vec<u8>,
    pub method: u64,
    pub crc32: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
}

fn label_u64<M: Maker>(maker: &M, name: &str) -> Result<u64> {
    let node = maker.label(name)?;
    node.leaf()
        .and_then(Value::as_u64)
        .ok_or_else(|| err(format!("label {:?} is not a number", name)))
}

fn record_bytes(node: &Node) -> Result<Vec<u8>> {
    node.leaf()
        .and_then(|v| v.as_bytes())
        .map(<[u8]>::to_vec)
        .ok_or_else(|| err("expected a bytes value"))
}

/// Parse (or rebuild) a whole archive. Assumes a plain layout -- local
/// entries, then the central directory, then the EOCD record -- with sizes
/// carried in the central directory; streamed entries (general-purpose flag
/// bit 3) carry them again in a data descriptor after the payload.
pub fn zip_archive<M: Maker>(maker: &mut M) -> Result<Vec<ZipEntry>> {
    maker.run("Ey")?;

    eocd_record(maker)?;
    let cd_offset = label_u64(maker, "cd_offset")?;
    let n_total = label_u64(maker, "n_total")?;

    let entries = central_directory(maker, cd_offset, n_total)?;
    local_entries(maker, &entries, cd_offset)?;
    Ok(entries)
}

/// Scan to the EOCD record and read it. Binds `n_total`, `cd_size`,
/// `cd_offset` and `comment_len`.
pub fn eocd_record<M: Maker>(maker: &mut M) -> Result<()> {
    maker.run(
        "[ m^\"06054b50\" ## scan to the EOCD signature PK\\x05\\x06
           u16 u16 u16 u16 #\"n_total\"
           u32 #\"cd_size\"
           u32 #\"cd_offset\"
           u16 #\"comment_len\"",
    )?;
    let comment_len = label_u64(maker, "comment_len")?;
    maker.run(&format!("C{} m$\"06054b50\" ]", comment_len * 8))?;
    Ok(())
}

/// Jump to the central directory and read its entries.
pub fn central_directory<M: Maker>(
    maker: &mut M,
    cd_offset: u64,
    n_total: u64,
) -> Result<Vec<ZipEntry>> {
    maker.run(&format!("[ js{}", cd_offset * 8))?;
    let mut entries = Vec::new();
    for _ in 0..n_total {
        maker.run(
            "[ B32 =b\"\\x02\\x01\\x4b\\x50\"; ## file header signature, byte-swapped
               u16 u16 u16
               u16 #\"method\"
               u16 u16
               u32 #\"crc\"
               u32 #\"csize\"
               u32 #\"usize\"
               u16 #\"fnlen\" u16 #\"eflen\" u16 #\"fclen\"
               u16 u16 u32
               u32 #\"lho\"",
        )?;
        let fnlen = label_u64(maker, "fnlen")?;
        let eflen = label_u64(maker, "eflen")?;
        let fclen = label_u64(maker, "fclen")?;
        maker.run(&format!(
            "C{} #\"fname\" C{} C{} ]",
            fnlen * 8,
            eflen * 8,
            fclen * 8
        ))?;
        entries.push(ZipEntry {
            name: record_bytes(&maker.label("fname")?)?,
            method: label_u64(maker, "method")?,
            crc32: label_u64(maker, "crc")?,
            compressed_size: label_u64(maker, "csize")?,
            uncompressed_size: label_u64(maker, "usize")?,
            local_header_offset: label_u64(maker, "lho")?,
        });
    }
    maker.run("] j$0")?;
    Ok(entries)
}

/// Visit each local file entry named by the central directory and read its
/// header, payload and, for a streamed entry, the trailing data descriptor.
///
/// Every size claim is reconciled against the gap between consecutive
/// local-header offsets (the central directory offset bounds the last
/// entry). That gap also decides whether a descriptor carries its optional
/// `PK\x07\x08` signature: the descriptor is whatever is left after the
/// header and payload, and only the 12- and 16-byte forms exist.
pub fn local_entries<M: Maker>(
    maker: &mut M,
    entries: &[ZipEntry],
    cd_offset: u64,
) -> Result<()> {
    maker.run("[")?;
    for (i, entry) in entries.iter().enumerate() {
        let entry_end = entries
            .get(i + 1)
            .map(|next| next.local_header_offset)
            .unwrap_or(cd_offset);
        let entry_size = entry_end.checked_sub(entry.local_header_offset).ok_or_else(|| {
            err(format!("local header offsets are not ascending at {:?}", entry.name))
        })?;
        maker.run(&format!("[ js{}", entry.local_header_offset * 8))?;
        maker.run(
            "B32 =b\"\\x04\\x03\\x4b\\x50\"; ## local header signature, byte-swapped
             u16 u16 #\"lflags\" u16 u16 u16
             u32 u32 u32
             u16 #\"lfnlen\" u16 #\"leflen\"",
        )?;
        let flags = label_u64(maker, "lflags")?;
        let fnlen = label_u64(maker, "lfnlen")?;
        let eflen = label_u64(maker, "leflen")?;
        maker.run(&format!(
            "C{} C{} C{}",
            fnlen * 8,
            eflen * 8,
            entry.compressed_size * 8
        ))?;
        let body = 30 + fnlen + eflen + entry.compressed_size;
        if flags & 0x0008 != 0 {
            // Streamed entry: the local header's size fields are zero and
            // the real values trail the payload.
            let trailer = entry_size.checked_sub(body).ok_or_else(|| {
                err(format!("local entry for {:?} overruns its slot", entry.name))
            })?;
            let fields = format!(
                "u32 ={}; u32 ={}; u32 ={}; ]",
                entry.crc32, entry.compressed_size, entry.uncompressed_size
            );
            match trailer {
                12 => maker.run(&fields)?,
                16 => maker.run(&format!("u32 =0x08074b50; {}", fields))?,
                other => {
                    return Err(err(format!(
                        "data descriptor for {:?} would be {} bytes, not 12 or 16",
                        entry.name, other
                    )))
                }
            };
        } else {
            if entry_size != body {
                return Err(err(format!(
                    "local entry for {:?} is {} bytes where header and payload total {}",
                    entry.name, entry_size, body
                )));
            }
            maker.run("]")?;
        }
    }
    maker.run("]")?;
    Ok(())
}
