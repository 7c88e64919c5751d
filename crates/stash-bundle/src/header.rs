use stash_types::{BlobLocator, ContentHash};

use crate::error::{BundleError, BundleResult};
use crate::varint::{decode_varint, encode_varint};

/// Bundle magic bytes.
pub const MAGIC: &[u8; 4] = b"SBH1";

/// Magic plus the header length field.
pub const MIN_HEADER_LEN: u64 = 8;

/// Largest header the parser accepts.
const MAX_HEADER_LEN: u64 = 64 * 1024 * 1024;

/// A node exported by a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleExport {
    pub hash: ContentHash,
    pub alias: Option<String>,
    /// Position of the node inside the bundle payload.
    pub index: u32,
}

/// Parsed bundle prelude.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleHeader {
    /// Blobs this bundle depends on.
    pub imports: Vec<BlobLocator>,
    pub exports: Vec<BundleExport>,
}

impl BundleHeader {
    pub fn new(imports: Vec<BlobLocator>, exports: Vec<BundleExport>) -> Self {
        Self { imports, exports }
    }

    /// Serialize the prelude, including magic and length.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        encode_varint(&mut body, self.imports.len() as u64);
        for locator in &self.imports {
            let text = locator.to_string();
            encode_varint(&mut body, text.len() as u64);
            body.extend_from_slice(text.as_bytes());
        }
        encode_varint(&mut body, self.exports.len() as u64);
        for export in &self.exports {
            body.extend_from_slice(export.hash.as_bytes());
            match &export.alias {
                Some(alias) => {
                    body.push(1);
                    encode_varint(&mut body, alias.len() as u64);
                    body.extend_from_slice(alias.as_bytes());
                }
                None => body.push(0),
            }
            encode_varint(&mut body, export.index as u64);
        }

        let total = MIN_HEADER_LEN as usize + body.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parse the prelude at the start of `data`.
    ///
    /// `data` may extend past the header; trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> BundleResult<Self> {
        split_bundle(data).map(|(header, _)| header)
    }
}

/// Parse the prelude and return it with the payload that follows.
pub fn split_bundle(data: &[u8]) -> BundleResult<(BundleHeader, &[u8])> {
    let available = data.len() as u64;
    if data.len() < MAGIC.len() {
        return if MAGIC.starts_with(data) {
            Err(BundleError::Truncated {
                needed: MIN_HEADER_LEN,
                available,
            })
        } else {
            Err(BundleError::NotABundle)
        };
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(BundleError::NotABundle);
    }
    if available < MIN_HEADER_LEN {
        return Err(BundleError::Truncated {
            needed: MIN_HEADER_LEN,
            available,
        });
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[4..8]);
    let total = u32::from_be_bytes(len_bytes) as u64;
    if !(MIN_HEADER_LEN..=MAX_HEADER_LEN).contains(&total) {
        return Err(BundleError::Corrupt {
            offset: 4,
            reason: format!("header length {total} out of range"),
        });
    }
    if available < total {
        return Err(BundleError::Truncated {
            needed: total,
            available,
        });
    }

    let total = total as usize;
    let mut cursor = Cursor {
        data: &data[..total],
        pos: MIN_HEADER_LEN as usize,
    };

    let import_count = cursor.count("import count")?;
    let mut imports = Vec::with_capacity(import_count);
    for _ in 0..import_count {
        let text = cursor.string("import locator")?;
        let locator = text.parse::<BlobLocator>().map_err(|e| BundleError::Corrupt {
            offset: cursor.pos,
            reason: format!("bad import locator {text:?}: {e}"),
        })?;
        imports.push(locator);
    }

    let export_count = cursor.count("export count")?;
    let mut exports = Vec::with_capacity(export_count);
    for _ in 0..export_count {
        let raw = cursor.take(ContentHash::LEN, "export hash")?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(raw);
        let alias = match cursor.take(1, "alias flag")?[0] {
            0 => None,
            1 => Some(cursor.string("alias")?),
            other => return Err(cursor.corrupt(format!("alias flag {other} is not 0 or 1"))),
        };
        let index = cursor.varint("export index")?;
        let index = u32::try_from(index)
            .map_err(|_| cursor.corrupt(format!("export index {index} exceeds u32")))?;
        exports.push(BundleExport {
            hash: ContentHash::from_raw(hash),
            alias,
            index,
        });
    }

    if cursor.pos != total {
        return Err(cursor.corrupt(format!("{} unparsed header bytes", total - cursor.pos)));
    }
    Ok((BundleHeader { imports, exports }, &data[total..]))
}

/// Concatenate an encoded prelude and a payload into one blob.
pub fn encode_bundle(header: &BundleHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = header.encode();
    out.extend_from_slice(payload);
    out
}

/// Bounds-checked reader over the declared header bytes. Running out of
/// bytes here is corruption, since the header length was already known.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn corrupt(&self, reason: String) -> BundleError {
        BundleError::Corrupt {
            offset: self.pos,
            reason,
        }
    }

    fn take(&mut self, n: usize, what: &str) -> BundleResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.corrupt(format!("{what} runs past header end")))?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn varint(&mut self, what: &str) -> BundleResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..])
            .ok_or_else(|| self.corrupt(format!("bad varint for {what}")))?;
        self.pos += consumed;
        Ok(value)
    }

    /// A count of items, each at least one byte long.
    fn count(&mut self, what: &str) -> BundleResult<usize> {
        let value = self.varint(what)?;
        let remaining = (self.data.len() - self.pos) as u64;
        if value > remaining {
            return Err(self.corrupt(format!("{what} {value} exceeds remaining {remaining} bytes")));
        }
        Ok(value as usize)
    }

    fn string(&mut self, what: &str) -> BundleResult<String> {
        let len = self.count(what)?;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.corrupt(format!("{what} is not UTF-8")))
    }
}
