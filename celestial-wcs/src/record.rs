//! Value types for one WCS solution and the distortion payload that travels
//! with the primary solution.

use celestial_headers::{Header, Keyword, KeywordValue};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{WcsError, WcsResult};
use crate::header::KeywordProvider;
use crate::keys::{is_coordinate_base, split_keyword, WcsKey};
use crate::linear::LinearTransform;

pub const WCSDVARR: &str = "WCSDVARR";
pub const D2IMARR: &str = "D2IMARR";

/// The keywords of one solution, stored under their unkeyed names.
///
/// A record is detached from any header: reading copies the cards out,
/// writing copies them in under a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcsRecord {
    keywords: Vec<Keyword>,
}

impl WcsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record stored under `key`, or `None` when no coordinate keyword
    /// carries that key.
    pub fn read(header: &Header, key: WcsKey) -> Option<Self> {
        let mut record = Self::new();
        let mut declared = false;
        for keyword in header.iter() {
            let Some((base, found)) = split_keyword(&keyword.name) else {
                continue;
            };
            if found != key {
                continue;
            }
            declared |= is_coordinate_base(base);
            let mut card = keyword.clone();
            card.name = base.to_string();
            record.push(card);
        }
        declared.then_some(record)
    }

    /// Adds a card named by its base, replacing one of the same name.
    pub fn push(&mut self, keyword: Keyword) {
        match self.keywords.iter_mut().find(|k| k.name == keyword.name) {
            Some(existing) => *existing = keyword,
            None => self.keywords.push(keyword),
        }
    }

    pub fn set(&mut self, base: &str, value: impl Into<KeywordValue>) {
        let value = value.into();
        match self.keywords.iter_mut().find(|k| k.name == base) {
            Some(existing) => existing.value = Some(value),
            None => self.keywords.push(Keyword::new(base).with_value(value)),
        }
    }

    pub fn remove(&mut self, base: &str) -> Option<Keyword> {
        let index = self.keywords.iter().position(|k| k.name == base)?;
        Some(self.keywords.remove(index))
    }

    pub fn get(&self, base: &str) -> Option<&KeywordValue> {
        self.keywords
            .iter()
            .find(|k| k.name == base)
            .and_then(|k| k.value.as_ref())
    }

    pub fn contains(&self, base: &str) -> bool {
        self.keywords.iter().any(|k| k.name == base)
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    /// Same keywords with the same values, ignoring card order and comments.
    pub fn same_values(&self, other: &WcsRecord) -> bool {
        self.keywords.len() == other.keywords.len()
            && self
                .keywords
                .iter()
                .all(|k| other.get(&k.name) == k.value.as_ref())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("WCSNAME")?.as_string()
    }

    pub fn set_name(&mut self, name: &str) {
        self.set("WCSNAME", name);
    }

    pub fn crpix(&self) -> WcsResult<[f64; 2]> {
        Ok([self.require_float("CRPIX1")?, self.require_float("CRPIX2")?])
    }

    pub fn crval(&self) -> WcsResult<[f64; 2]> {
        Ok([self.require_float("CRVAL1")?, self.require_float("CRVAL2")?])
    }

    pub fn ctype(&self) -> [Option<String>; 2] {
        [self.get_string("CTYPE1"), self.get_string("CTYPE2")]
    }

    /// The CD matrix, derived from `PCi_j`/`CDELTi` when no `CDi_j` is present.
    pub fn cd(&self) -> WcsResult<[[f64; 2]; 2]> {
        const CD: [[&str; 2]; 2] = [["CD1_1", "CD1_2"], ["CD2_1", "CD2_2"]];
        const PC: [[&str; 2]; 2] = [["PC1_1", "PC1_2"], ["PC2_1", "PC2_2"]];

        if CD.iter().flatten().any(|name| self.contains(name)) {
            return Ok(CD.map(|row| row.map(|name| self.get_float(name).unwrap_or(0.0))));
        }
        let has_cdelt = self.contains("CDELT1") || self.contains("CDELT2");
        if !has_cdelt && !PC.iter().flatten().any(|name| self.contains(name)) {
            return Err(WcsError::missing_keyword("CD1_1"));
        }
        let mut pc = [[1.0, 0.0], [0.0, 1.0]];
        for (i, row) in PC.iter().enumerate() {
            for (j, name) in row.iter().enumerate() {
                if let Some(value) = self.get_float(name) {
                    pc[i][j] = value;
                }
            }
        }
        let cdelt = [
            self.get_float("CDELT1").unwrap_or(1.0),
            self.get_float("CDELT2").unwrap_or(1.0),
        ];
        Ok([
            [cdelt[0] * pc[0][0], cdelt[0] * pc[0][1]],
            [cdelt[1] * pc[1][0], cdelt[1] * pc[1][1]],
        ])
    }

    pub fn linear(&self) -> WcsResult<LinearTransform> {
        LinearTransform::from_cd(self.crpix()?, self.cd()?)
    }

    /// Replaces the linear part with an explicit CD matrix.
    pub fn set_cd(&mut self, cd: [[f64; 2]; 2]) {
        for base in ["PC1_1", "PC1_2", "PC2_1", "PC2_2", "CDELT1", "CDELT2"] {
            self.remove(base);
        }
        for (i, row) in cd.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                self.set(&format!("CD{}_{}", i + 1, j + 1), *value);
            }
        }
    }

    /// Copy with any `-SIP` suffix dropped from the axis types.
    pub fn without_sip_ctype(&self) -> Self {
        let mut record = self.clone();
        for keyword in &mut record.keywords {
            if !keyword.name.starts_with("CTYPE") {
                continue;
            }
            let stripped = match &keyword.value {
                Some(KeywordValue::String(ctype)) => ctype.strip_suffix("-SIP").map(str::to_string),
                _ => None,
            };
            if let Some(ctype) = stripped {
                keyword.value = Some(KeywordValue::String(ctype));
            }
        }
        record
    }

    /// Writes every card under `key`, updating existing cards in place.
    pub fn write(&self, header: &mut Header, key: WcsKey) {
        for keyword in &self.keywords {
            let mut card = keyword.clone();
            card.name = key.keyword(&keyword.name);
            header.set_keyword(card);
        }
    }

    /// Makes the record at `key` equal to this one: cards under `key` that
    /// this record lacks are removed before writing.
    pub fn replace(&self, header: &mut Header, key: WcsKey) {
        header.retain(|keyword| match split_keyword(&keyword.name) {
            Some((base, found)) => found != key || self.contains(base),
            None => true,
        });
        self.write(header, key);
    }

    /// Removes every card of the record at `key`. Returns how many went.
    pub fn erase(header: &mut Header, key: WcsKey) -> usize {
        let before = header.len();
        header.retain(|keyword| !matches!(split_keyword(&keyword.name), Some((_, found)) if found == key));
        before - header.len()
    }
}

impl KeywordProvider for WcsRecord {
    fn get_value(&self, key: &str) -> Option<&KeywordValue> {
        self.get(key)
    }
}

static SIP_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:A|B|AP|BP)_(?:\d+_\d+|ORDER|DMAX)|SIPNAME)$").unwrap());

static LOOKUP_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:CPDIS|CPERR)[1-9]|DP[1-9]\..+|NPOLEXT)$").unwrap());

static DET2IM_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:D2IMDIS|D2IMERR)[1-9]|D2IM[1-9]\..+|D2IMEXT|AXISCORR)$").unwrap()
});

static TABLE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<prefix>DP|D2IM)(?P<axis>[1-9])\.EXTVER$").unwrap());

/// The three nonlinear corrections a primary solution may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistortionKind {
    Sip,
    Lookup,
    Det2Im,
}

impl DistortionKind {
    pub const ALL: [DistortionKind; 3] = [Self::Sip, Self::Lookup, Self::Det2Im];

    pub fn of(name: &str) -> Option<Self> {
        if SIP_KEYWORD.is_match(name) {
            Some(Self::Sip)
        } else if LOOKUP_KEYWORD.is_match(name) {
            Some(Self::Lookup)
        } else if DET2IM_KEYWORD.is_match(name) {
            Some(Self::Det2Im)
        } else {
            None
        }
    }

    /// Keyword naming the model this payload came from.
    pub fn identity_keyword(self) -> &'static str {
        match self {
            Self::Sip => "SIPNAME",
            Self::Lookup => "NPOLEXT",
            Self::Det2Im => "D2IMEXT",
        }
    }

    /// Extension name of the tables this kind refers to.
    pub fn table_extname(self) -> Option<&'static str> {
        match self {
            Self::Sip => None,
            Self::Lookup => Some(WCSDVARR),
            Self::Det2Im => Some(D2IMARR),
        }
    }
}

/// A payload keyword pointing at a table extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef {
    pub kind: DistortionKind,
    pub axis: u32,
    pub extver: u32,
}

impl TableRef {
    pub fn extname(&self) -> &'static str {
        match self.kind {
            DistortionKind::Det2Im => D2IMARR,
            _ => WCSDVARR,
        }
    }

    pub fn keyword(&self) -> String {
        match self.kind {
            DistortionKind::Det2Im => format!("D2IM{}.EXTVER", self.axis),
            _ => format!("DP{}.EXTVER", self.axis),
        }
    }
}

/// Unkeyed nonlinear distortion keywords of a primary solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistortionPayload {
    keywords: Vec<Keyword>,
}

impl DistortionPayload {
    pub fn read(header: &Header) -> Self {
        let keywords = header
            .iter()
            .filter(|k| DistortionKind::of(&k.name).is_some())
            .cloned()
            .collect();
        Self { keywords }
    }

    pub fn from_keywords(keywords: impl IntoIterator<Item = Keyword>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .filter(|k| DistortionKind::of(&k.name).is_some())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn get(&self, name: &str) -> Option<&KeywordValue> {
        self.keywords
            .iter()
            .find(|k| k.name == name)
            .and_then(|k| k.value.as_ref())
    }

    pub fn has(&self, kind: DistortionKind) -> bool {
        self.keywords
            .iter()
            .any(|k| DistortionKind::of(&k.name) == Some(kind))
    }

    /// Model identity recorded for `kind`, if any.
    pub fn identity(&self, kind: DistortionKind) -> Option<&str> {
        self.get(kind.identity_keyword())?.as_string()
    }

    pub fn set_identity(&mut self, kind: DistortionKind, value: &str) {
        self.set(kind.identity_keyword(), value);
    }

    pub fn set(&mut self, name: &str, value: impl Into<KeywordValue>) {
        let value = value.into();
        match self.keywords.iter_mut().find(|k| k.name == name) {
            Some(existing) => existing.value = Some(value),
            None => self.keywords.push(Keyword::new(name).with_value(value)),
        }
    }

    pub fn sip_order(&self) -> Option<(i64, i64)> {
        Some((
            self.get("A_ORDER")?.as_integer()?,
            self.get("B_ORDER")?.as_integer()?,
        ))
    }

    /// Forward SIP coefficients `A_p_q`/`B_p_q` with their values.
    pub fn sip_coefficients(&self) -> Vec<(&str, f64)> {
        self.keywords
            .iter()
            .filter(|k| {
                let name = k.name.as_str();
                (name.starts_with("A_") || name.starts_with("B_"))
                    && !name.ends_with("ORDER")
                    && !name.ends_with("DMAX")
            })
            .filter_map(|k| Some((k.name.as_str(), k.value.as_ref()?.as_real()?)))
            .collect()
    }

    pub fn table_refs(&self) -> Vec<TableRef> {
        self.keywords
            .iter()
            .filter_map(|k| {
                let caps = TABLE_REFERENCE.captures(&k.name)?;
                let kind = match &caps["prefix"] {
                    "D2IM" => DistortionKind::Det2Im,
                    _ => DistortionKind::Lookup,
                };
                let axis = caps["axis"].parse().ok()?;
                let extver = u32::try_from(k.value.as_ref()?.as_integer()?).ok()?;
                Some(TableRef { kind, axis, extver })
            })
            .collect()
    }

    /// Points the reference for (`kind`, `axis`) at table version `extver`.
    pub fn renumber(&mut self, kind: DistortionKind, axis: u32, extver: u32) {
        let reference = TableRef { kind, axis, extver };
        self.set(&reference.keyword(), i64::from(extver));
    }

    /// Drops every keyword of `kind`.
    pub fn without(&self, kind: DistortionKind) -> Self {
        Self {
            keywords: self
                .keywords
                .iter()
                .filter(|k| DistortionKind::of(&k.name) != Some(kind))
                .cloned()
                .collect(),
        }
    }

    /// Makes the header's payload equal to this one, updating cards in place.
    pub fn replace(&self, header: &mut Header) {
        header.retain(|k| {
            DistortionKind::of(&k.name).is_none() || self.keywords.iter().any(|own| own.name == k.name)
        });
        for keyword in &self.keywords {
            header.set_keyword(keyword.clone());
        }
    }

    /// Removes the payload of `kind` from `header`. Returns how many cards went.
    pub fn strip(header: &mut Header, kind: DistortionKind) -> usize {
        let before = header.len();
        header.retain(|k| DistortionKind::of(&k.name) != Some(kind));
        before - header.len()
    }
}
