//! On-disk catalog codec.
//!
//! Layout, little-endian throughout: a 14-byte magic, a u32 entry count,
//! a u32 meta-section size, the meta section (a gzip stream of
//! newline-delimited compact JSON entries) and the preview blob running
//! to EOF. The fixed-width header lets a decoder slice the file without
//! parsing the blob; the gzip+JSON meta keeps the records debuggable.

use std::io::{BufRead, BufReader, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::error::CatalogError;

use super::entry::Entry;

pub const MAGIC: &[u8; 14] = b"TINYTUNE_INDEX";

/// Decoded catalog file: entry records plus the raw preview blob.
#[derive(Debug, Default)]
pub struct RawCatalog {
    pub entries: Vec<Entry>,
    pub blob: Vec<u8>,
}

/// Decode a catalog file.
///
/// An empty file is a valid, empty catalog. A truncated file yields
/// whatever entries were recoverable, with a warning. Only a wrong magic
/// value is fatal.
pub fn decode<R: Read>(reader: &mut R) -> Result<RawCatalog, CatalogError> {
    let mut raw = RawCatalog::default();

    let mut header = [0u8; MAGIC.len()];
    let read = read_full(reader, &mut header)?;
    if read == 0 {
        return Ok(raw);
    }
    if read < header.len() || &header != MAGIC {
        return Err(CatalogError::InvalidHeader(header[..read].to_vec()));
    }

    let Some(entry_count) = read_u32(reader)? else {
        warn!("catalog file ends inside the header, starting fresh");
        return Ok(raw);
    };
    let Some(meta_size) = read_u32(reader)? else {
        warn!("catalog file ends inside the header, starting fresh");
        return Ok(raw);
    };

    let mut meta = vec![0u8; meta_size as usize];
    let read = read_full(reader, &mut meta)?;
    if read < meta.len() {
        warn!(
            expected = meta.len(),
            read, "catalog meta section is truncated"
        );
        meta.truncate(read);
    }

    let mut lines = BufReader::new(GzDecoder::new(meta.as_slice())).lines();
    for _ in 0..entry_count {
        match lines.next() {
            Some(Ok(line)) => match serde_json::from_str::<Entry>(&line) {
                Ok(entry) => raw.entries.push(entry),
                Err(error) => {
                    warn!(%error, "skipping undecodable catalog entries");
                    break;
                }
            },
            Some(Err(error)) => {
                warn!(%error, "catalog meta stream is corrupted");
                break;
            }
            None => break,
        }
    }
    if raw.entries.len() < entry_count as usize {
        warn!(
            expected = entry_count,
            decoded = raw.entries.len(),
            "the catalog file could not be fully read, it may be corrupted"
        );
    }

    reader.read_to_end(&mut raw.blob)?;
    Ok(raw)
}

/// Encode entries and blob into the on-disk form; returns bytes written.
pub fn encode<W: Write>(
    entries: &[&Entry],
    blob: &[u8],
    writer: &mut W,
) -> Result<u64, CatalogError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for entry in entries {
        serde_json::to_writer(&mut encoder, entry)?;
        encoder.write_all(b"\n")?;
    }
    let meta = encoder.finish()?;

    writer.write_all(MAGIC)?;
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    writer.write_all(&(meta.len() as u32).to_le_bytes())?;
    writer.write_all(&meta)?;
    writer.write_all(blob)?;

    Ok((MAGIC.len() + 2 * std::mem::size_of::<u32>() + meta.len() + blob.len()) as u64)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<Option<u32>, CatalogError> {
    let mut buf = [0u8; 4];
    if read_full(reader, &mut buf)? < buf.len() {
        return Ok(None);
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

/// Read until the buffer is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CatalogError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
