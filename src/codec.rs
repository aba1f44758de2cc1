//! The sectioned `key=value` text format spoken by the fleet members' admin API.
//!
//! ```text
//! [common]
//! server_addr=10.0.0.1
//!
//! [web]
//! local_port=8080
//! type=http
//! ```
//!
//! Decoding never tries to recover typed entries: every proxy section comes
//! back as [`Entry::Raw`], which is enough since entries compare on their
//! fields.

use std::collections::BTreeMap as Map;
use std::fmt::{self, Write};

use crate::proxy::{Entry, Fields, Redacted};

pub const COMMON_SECTION: &str = "common";
/// name of the section holding keys written before any header
pub const DEFAULT_SECTION: &str = "DEFAULT";
/// range sections are expanded by the server itself
pub const RANGE_PREFIX: &str = "range:";

/// Proxy entries by (unique) proxy name.
pub type Proxies = Map<String, Entry>;

/// Full configuration of one fleet member.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub common: Fields,
    pub proxies: Proxies,
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("common", &Redacted(&self.common))
            .field("proxies", &self.proxies)
            .finish()
    }
}

impl Bundle {
    pub fn new(common: Fields, proxies: Proxies) -> Self {
        Self { common, proxies }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("line {0}: unclosed section header")]
    UnclosedSection(usize),
    #[error("line {0}: empty section name")]
    EmptySection(usize),
    #[error("line {0}: empty key")]
    EmptyKey(usize),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub fn decode(data: &[u8]) -> Result<Bundle, DecodeError> {
    let text = std::str::from_utf8(data)?;

    let mut sections: Map<&str, Fields> = Map::new();
    let mut current = DEFAULT_SECTION;

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or(DecodeError::UnclosedSection(line_no))?
                .trim();
            if name.is_empty() {
                return Err(DecodeError::EmptySection(line_no));
            }
            current = name;
            sections.entry(current).or_default();
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), unquote(value.trim())),
            // boolean key
            None => (line, "true"),
        };
        if key.is_empty() {
            return Err(DecodeError::EmptyKey(line_no));
        }

        (sections.entry(current).or_default()).insert(key.to_string(), value.to_string());
    }

    let mut bundle = Bundle::default();
    for (name, fields) in sections {
        if name == COMMON_SECTION {
            bundle.common = fields;
        } else if name == DEFAULT_SECTION || name.starts_with(RANGE_PREFIX) {
            continue;
        } else {
            bundle.proxies.insert(name.to_string(), Entry::Raw(fields));
        }
    }

    Ok(bundle)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '`'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("invalid section name {0:?}")]
    InvalidSection(String),
    #[error("[{0}]: invalid key {1:?}")]
    InvalidKey(String, String),
    #[error("[{0}]: invalid value for {1}")]
    InvalidValue(String, String),
}

/// Encode a bundle. The output only depends on the bundle's content:
/// sections (`common` included) are sorted by name, and keys are sorted
/// inside each section.
///
/// Values with surrounding whitespace or quotes are quoted so they decode
/// back unchanged. Anything that can't be written so that it decodes back
/// unchanged is an error.
pub fn encode(bundle: &Bundle) -> Result<String, EncodeError> {
    let mut sections: Map<&str, Fields> = Map::new();

    if !bundle.common.is_empty() {
        check_fields(COMMON_SECTION, &bundle.common)?;
        sections.insert(COMMON_SECTION, bundle.common.clone());
    }
    for (name, entry) in &bundle.proxies {
        let fields = entry.fields();
        check_section(name, &fields)?;
        sections.insert(name, fields);
    }

    let mut buf = String::new();
    for (name, fields) in &sections {
        write_section(&mut buf, name, fields);
    }
    Ok(buf)
}

/// Check that a proxy section can be encoded.
pub fn check_section(name: &str, fields: &Fields) -> Result<(), EncodeError> {
    let reserved = name == COMMON_SECTION || name == DEFAULT_SECTION || name.starts_with(RANGE_PREFIX);
    if reserved || name.is_empty() || name.trim() != name || has_newline(name) {
        return Err(EncodeError::InvalidSection(name.to_string()));
    }
    check_fields(name, fields)
}

fn check_fields(section: &str, fields: &Fields) -> Result<(), EncodeError> {
    for (key, value) in fields {
        let valid_key = !key.is_empty()
            && key.trim() == key
            && !key.contains('=')
            && !key.starts_with(['#', ';', '['])
            && !has_newline(key);
        if !valid_key {
            return Err(EncodeError::InvalidKey(section.to_string(), key.clone()));
        }
        if has_newline(value) {
            return Err(EncodeError::InvalidValue(section.to_string(), key.clone()));
        }
    }
    Ok(())
}

fn has_newline(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

fn write_section(buf: &mut String, name: &str, fields: &Fields) {
    // writing to a String can't fail
    let _ = writeln!(buf, "[{name}]");
    for (k, v) in fields {
        if needs_quotes(v) {
            let _ = writeln!(buf, "{k}=\"{v}\"");
        } else {
            let _ = writeln!(buf, "{k}={v}");
        }
    }
    buf.push('\n');
}

/// Decoding trims values and removes one pair of surrounding quotes.
fn needs_quotes(value: &str) -> bool {
    let edge = |c: char| c.is_whitespace() || c == '"' || c == '`';
    value.starts_with(edge) || value.ends_with(edge)
}

/// Same proxy names, and same fields for each of them.
pub fn same_proxies(a: &Proxies, b: &Proxies) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(name, entry)| b.get(name).is_some_and(|other| other == entry))
}
