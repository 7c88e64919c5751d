//! Bundle header prelude for stash.
//!
//! A bundle is a blob that packs one or more nodes and may import other
//! blobs. Its first bytes are a self-describing prelude listing those
//! imports and the nodes it exports; the rest of the blob is opaque payload.
//!
//! # Layout
//!
//! ```text
//! "SBH1" | u32 BE header length | varint n | n × (varint len, utf8 locator)
//!        | varint m | m × (32-byte hash, u8 has_alias, [varint len, utf8 alias], varint index)
//! ```
//!
//! The header length counts every prelude byte including the magic.
//!
//! # Design Rules
//!
//! 1. A blob that does not start with the magic is a leaf, not an error.
//! 2. Too few bytes is [`BundleError::Truncated`]; the caller may fetch more.
//! 3. The parser never panics on arbitrary input.

pub mod error;
pub mod fetch;
pub mod header;
mod varint;

pub use error::{BundleError, BundleResult};
pub use fetch::read_header;
pub use header::{encode_bundle, split_bundle, BundleExport, BundleHeader, MAGIC, MIN_HEADER_LEN};
