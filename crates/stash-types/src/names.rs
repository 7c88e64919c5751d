//! Validated names: namespaces, hosts and refs.
//!
//! Namespace and host identifiers appear in backend paths and locators, so
//! they are restricted to lowercase ASCII alphanumerics plus `-`, `_` and `.`.
//!
//! Ref names are looser and follow git-style conventions:
//! - Must be non-empty and at most 256 bytes
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..`
//! - Must not start or end with `/`, and must not contain `//`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const MAX_ID_LEN: usize = 64;
const MAX_REF_NAME_LEN: usize = 256;

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_REF_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

fn invalid(kind: &'static str, value: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidName {
        kind,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Validate an identifier used for namespaces, backends and hosts.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), TypeError> {
    if value.is_empty() {
        return Err(invalid(kind, value, "must not be empty"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(invalid(kind, value, format!("longer than {MAX_ID_LEN} bytes")));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(kind, value, format!("contains forbidden character: {ch:?}")));
    }
    if value.starts_with('.') || value.starts_with('-') {
        return Err(invalid(kind, value, "must start with a letter, digit or '_'"));
    }
    Ok(())
}

/// Validate a ref name.
///
/// ```
/// use stash_types::names::validate_ref_name;
///
/// assert!(validate_ref_name("latest").is_ok());
/// assert!(validate_ref_name("builds/main/1234").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<(), TypeError> {
    const KIND: &str = "ref name";
    if name.is_empty() {
        return Err(invalid(KIND, name, "must not be empty"));
    }
    if name.len() > MAX_REF_NAME_LEN {
        return Err(invalid(KIND, name, format!("longer than {MAX_REF_NAME_LEN} bytes")));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_REF_CHARS.contains(c))
    {
        return Err(invalid(KIND, name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(KIND, name, "must not contain '..'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(KIND, name, "must not start or end with '/'"));
    }
    if name.contains("//") {
        return Err(invalid(KIND, name, "must not contain consecutive slashes '//'"));
    }
    Ok(())
}

/// Identifier of a logical storage tenant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceId(String);

impl NamespaceId {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        validate_identifier("namespace id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NamespaceId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NamespaceId> for String {
    fn from(id: NamespaceId) -> Self {
        id.0
    }
}

impl fmt::Debug for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespaceId({})", self.0)
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a ref, unique within its namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        validate_ref_name(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl fmt::Debug for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefName({})", self.0)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
