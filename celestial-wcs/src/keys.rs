//! WCS keys and the registry of keyed records in one header.
//!
//! Alternate solutions live side by side in a header, each keyword carrying a
//! one-letter suffix (`CRPIX1A`, `CD1_1A`, `WCSNAMEA`). The unkeyed set is the
//! primary solution. [`KeyIndex::scan`] reads every record in one pass.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use celestial_headers::Header;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{WcsError, WcsResult};
use crate::record::WcsRecord;

/// Keyword names that make up a WCS record. `base` is the unkeyed name,
/// `key` the optional alternate suffix.
static RECORD_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<base>
            (?:CRPIX|CRVAL|CTYPE|CDELT|CUNIT)[1-9]
          | (?:CD|PC)[1-9]_[1-9]
          | WCSNAME | WCSAXES | LONPOLE | LATPOLE | RADESYS | EQUINOX
        )
        (?P<key>[A-Z])?$
        ",
    )
    .unwrap()
});

/// Bases whose presence declares a solution; the scalar keywords alone do not.
static COORDINATE_BASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:CRPIX|CRVAL|CTYPE|CDELT|CUNIT)[1-9]|(?:CD|PC)[1-9]_[1-9]|WCSNAME)$").unwrap());

/// A WCS key: blank for the primary solution, `A`..=`Z` for alternates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WcsKey(char);

impl WcsKey {
    pub const PRIMARY: WcsKey = WcsKey(' ');
    /// Holds the solution the file arrived with before any update.
    pub const ORIGINAL: WcsKey = WcsKey('O');

    pub fn new(c: char) -> WcsResult<Self> {
        match c {
            ' ' | 'A'..='Z' => Ok(Self(c)),
            'a'..='z' => Ok(Self(c.to_ascii_uppercase())),
            _ => Err(WcsError::argument(format!(
                "WCS key must be blank or a letter A-Z, got {c:?}"
            ))),
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }

    pub fn is_primary(self) -> bool {
        self.0 == ' '
    }

    pub fn is_reserved(self) -> bool {
        self == Self::ORIGINAL
    }

    /// Keyword name for `base` under this key.
    pub fn keyword(self, base: &str) -> String {
        if self.is_primary() {
            base.to_string()
        } else {
            format!("{base}{}", self.0)
        }
    }

    /// Alternate keys in allocation order.
    pub fn alternates() -> impl Iterator<Item = WcsKey> {
        ('A'..='Z').map(WcsKey)
    }
}

impl FromStr for WcsKey {
    type Err = WcsError;

    fn from_str(s: &str) -> WcsResult<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => Err(WcsError::argument(format!(
                "WCS key must be exactly one character, got {s:?}"
            ))),
        }
    }
}

impl TryFrom<char> for WcsKey {
    type Error = WcsError;

    fn try_from(c: char) -> WcsResult<Self> {
        Self::new(c)
    }
}

impl fmt::Display for WcsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Splits a record keyword into its base name and key.
pub fn split_keyword(name: &str) -> Option<(&str, WcsKey)> {
    let caps = RECORD_KEYWORD.captures(name)?;
    let base = caps.name("base")?.as_str();
    let key = match caps.name("key") {
        Some(m) => m.as_str().chars().next().map(WcsKey).unwrap_or(WcsKey::PRIMARY),
        None => WcsKey::PRIMARY,
    };
    Some((base, key))
}

pub fn is_coordinate_base(base: &str) -> bool {
    COORDINATE_BASE.is_match(base)
}

/// Every WCS record of one header, by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyIndex {
    records: BTreeMap<WcsKey, WcsRecord>,
}

impl KeyIndex {
    pub fn scan(header: &Header) -> Self {
        let mut records: BTreeMap<WcsKey, WcsRecord> = BTreeMap::new();
        let mut declared: Vec<WcsKey> = Vec::new();
        for keyword in header.iter() {
            let Some((base, key)) = split_keyword(&keyword.name) else {
                continue;
            };
            if is_coordinate_base(base) && !declared.contains(&key) {
                declared.push(key);
            }
            let mut card = keyword.clone();
            card.name = base.to_string();
            records.entry(key).or_default().push(card);
        }
        records.retain(|key, _| declared.contains(key));
        Self { records }
    }

    pub fn keys(&self) -> Vec<WcsKey> {
        self.records.keys().copied().collect()
    }

    pub fn contains(&self, key: WcsKey) -> bool {
        self.records.contains_key(&key)
    }

    pub fn get(&self, key: WcsKey) -> Option<&WcsRecord> {
        self.records.get(&key)
    }

    pub fn name(&self, key: WcsKey) -> Option<&str> {
        self.records.get(&key)?.name()
    }

    /// First key, in order blank, `A`, `B`, ..., whose `WCSNAME` equals `name`.
    pub fn key_for_name(&self, name: &str) -> Option<WcsKey> {
        self.records
            .iter()
            .find(|(_, record)| record.name() == Some(name))
            .map(|(key, _)| *key)
    }

    /// Lowest unused alternate key, skipping the reserved `O`.
    pub fn next_free(&self) -> Option<WcsKey> {
        WcsKey::alternates().find(|key| !key.is_reserved() && !self.contains(*key))
    }

    /// Names of every keyed solution, for reporting.
    pub fn names(&self) -> Vec<(WcsKey, Option<String>)> {
        self.records
            .iter()
            .map(|(key, record)| (*key, record.name().map(str::to_string)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn list_keys(header: &Header) -> Vec<WcsKey> {
    KeyIndex::scan(header).keys()
}

pub fn next_free_key(header: &Header) -> Option<WcsKey> {
    KeyIndex::scan(header).next_free()
}

pub fn key_for_name(header: &Header, name: &str) -> Option<WcsKey> {
    KeyIndex::scan(header).key_for_name(name)
}
