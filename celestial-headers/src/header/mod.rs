//! Ordered keyword storage for one extension.
//!
//! Cards keep their insertion order. Lookups go through a name index that
//! points at the first card with a given name, so repeated commentary cards
//! (`HISTORY`, `COMMENT`) never shadow each other.

pub mod keywords;

pub use keywords::{Keyword, KeywordValue};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Keyword>", into = "Vec<Keyword>")]
pub struct Header {
    keywords: Vec<Keyword>,
    keyword_index: HashMap<String, usize>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_keyword(&mut self, keyword: Keyword) {
        let index = self.keywords.len();
        self.keyword_index
            .entry(keyword.name.clone())
            .or_insert(index);
        self.keywords.push(keyword);
    }

    pub fn get_keyword(&self, name: &str) -> Option<&Keyword> {
        self.keyword_index
            .get(name)
            .and_then(|&index| self.keywords.get(index))
    }

    pub fn get_keyword_value(&self, name: &str) -> Option<&KeywordValue> {
        self.get_keyword(name)?.value.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keyword_index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.keyword_index.get(name).copied()
    }

    /// Sets the value of `name`, keeping the card's position and comment when
    /// it already exists and appending it otherwise.
    pub fn set(&mut self, name: &str, value: impl Into<KeywordValue>) {
        let value = value.into();
        match self.keyword_index.get(name) {
            Some(&index) => self.keywords[index].value = Some(value),
            None => self.add_keyword(Keyword::new(name).with_value(value)),
        }
    }

    /// Replaces the first card named like `keyword` in place, or appends it.
    pub fn set_keyword(&mut self, keyword: Keyword) {
        match self.keyword_index.get(&keyword.name) {
            Some(&index) => self.keywords[index] = keyword,
            None => self.add_keyword(keyword),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Keyword> {
        let index = self.keyword_index.get(name).copied()?;
        let removed = self.keywords.remove(index);
        self.reindex();
        Some(removed)
    }

    /// Removes every card for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Keyword) -> bool,
    {
        let before = self.keywords.len();
        self.keywords.retain(|k| keep(k));
        if self.keywords.len() != before {
            self.reindex();
        }
    }

    /// Inserts `keyword` directly before the first card named `anchor`.
    /// Returns false, leaving the header untouched, when `anchor` is absent.
    pub fn insert_before(&mut self, anchor: &str, keyword: Keyword) -> bool {
        match self.position(anchor) {
            Some(index) => {
                self.insert_at(index, keyword);
                true
            }
            None => false,
        }
    }

    /// Inserts `keyword` directly after the first card named `anchor`.
    pub fn insert_after(&mut self, anchor: &str, keyword: Keyword) -> bool {
        match self.position(anchor) {
            Some(index) => {
                self.insert_at(index + 1, keyword);
                true
            }
            None => false,
        }
    }

    pub fn insert_at(&mut self, index: usize, keyword: Keyword) {
        let index = index.min(self.keywords.len());
        self.keywords.insert(index, keyword);
        self.reindex();
    }

    /// Index of the last card that is not blank.
    pub fn last_non_blank(&self) -> Option<usize> {
        self.keywords.iter().rposition(|k| !k.is_blank())
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    fn reindex(&mut self) {
        self.keyword_index.clear();
        for (index, keyword) in self.keywords.iter().enumerate() {
            self.keyword_index
                .entry(keyword.name.clone())
                .or_insert(index);
        }
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.keywords == other.keywords
    }
}

impl From<Vec<Keyword>> for Header {
    fn from(keywords: Vec<Keyword>) -> Self {
        let mut header = Self {
            keywords,
            keyword_index: HashMap::new(),
        };
        header.reindex();
        header
    }
}

impl From<Header> for Vec<Keyword> {
    fn from(header: Header) -> Self {
        header.keywords
    }
}

impl FromIterator<Keyword> for Header {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
