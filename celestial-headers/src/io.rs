//! File-backed extension lists.
//!
//! An [`HduList`] is loaded fully into memory. In [`OpenMode::Update`] the
//! in-memory state is written back by [`HduList::close`]; the write goes to a
//! temporary file in the same directory which then replaces the original, so
//! readers never see a half-written file. [`HduList::with_update`] scopes one
//! update: the closure's changes are persisted only when it returns `Ok`.

use crate::errors::{HeaderError, Result};
use crate::hdu::{ExtensionId, Hdu};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    #[default]
    Update,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HduList {
    hdus: Vec<Hdu>,
    #[serde(skip)]
    mode: OpenMode,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl PartialEq for HduList {
    fn eq(&self, other: &Self) -> bool {
        self.hdus == other.hdus
    }
}

impl HduList {
    /// An in-memory list holding only an empty primary HDU.
    pub fn new() -> Self {
        Self::from_hdus(vec![Hdu::primary()])
    }

    pub fn from_hdus(hdus: Vec<Hdu>) -> Self {
        Self {
            hdus,
            mode: OpenMode::Update,
            path: None,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut list: HduList = serde_json::from_reader(BufReader::new(file))?;
        if list.hdus.is_empty() {
            return Err(HeaderError::InvalidFormat(format!(
                "{} contains no extensions",
                path.display()
            )));
        }
        list.mode = mode;
        list.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), extensions = list.hdus.len(), ?mode, "opened");
        Ok(list)
    }

    /// Runs `op` on the file opened for update and persists the result only
    /// when `op` succeeds.
    pub fn with_update<P, T, E, F>(path: P, op: F) -> std::result::Result<T, E>
    where
        P: AsRef<Path>,
        E: From<HeaderError>,
        F: FnOnce(&mut HduList) -> std::result::Result<T, E>,
    {
        let mut list = Self::open(path, OpenMode::Update)?;
        let value = op(&mut list)?;
        list.close()?;
        Ok(value)
    }

    /// Writes the whole list to `path` atomically.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        temp.persist(path)?;
        Ok(())
    }

    /// Persists pending changes when opened for update from a file.
    pub fn flush(&self) -> Result<()> {
        match (&self.path, self.mode) {
            (Some(path), OpenMode::Update) => self.write_to(path),
            _ => Ok(()),
        }
    }

    pub fn close(self) -> Result<()> {
        self.flush()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_writable(&self) -> bool {
        self.mode == OpenMode::Update
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Detaches the list from its file; the copy is a writable in-memory list.
    pub fn detached(&self) -> Self {
        Self::from_hdus(self.hdus.clone())
    }

    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hdu> {
        self.hdus.iter()
    }

    pub fn primary(&self) -> Option<&Hdu> {
        self.hdus.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut Hdu> {
        self.hdus.first_mut()
    }

    pub fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.hdus
            .get(index)
            .ok_or_else(|| HeaderError::ExtensionNotFound(index.to_string()))
    }

    pub fn hdu_mut(&mut self, index: usize) -> Result<&mut Hdu> {
        self.hdus
            .get_mut(index)
            .ok_or_else(|| HeaderError::ExtensionNotFound(index.to_string()))
    }

    pub fn find(&self, name: &str, ver: u32) -> Option<usize> {
        self.hdus
            .iter()
            .position(|hdu| hdu.is_named(name) && hdu.extver() == ver)
    }

    pub fn index_of(&self, id: &ExtensionId) -> Result<usize> {
        let index = match id {
            ExtensionId::Index(index) => (*index < self.hdus.len()).then_some(*index),
            ExtensionId::Named { name, ver } => self.find(name, *ver),
        };
        index.ok_or_else(|| HeaderError::ExtensionNotFound(id.to_string()))
    }

    pub fn get(&self, id: &ExtensionId) -> Result<&Hdu> {
        let index = self.index_of(id)?;
        self.hdu(index)
    }

    pub fn get_mut(&mut self, id: &ExtensionId) -> Result<&mut Hdu> {
        let index = self.index_of(id)?;
        self.hdu_mut(index)
    }

    /// Indexes of every extension whose `EXTNAME` matches, in file order.
    pub fn indices_named(&self, name: &str) -> Vec<usize> {
        self.hdus
            .iter()
            .enumerate()
            .filter(|(_, hdu)| hdu.is_named(name))
            .map(|(index, _)| index)
            .collect()
    }

    /// Highest `EXTVER` among extensions called `name`, or 0 when none exist.
    pub fn max_extver(&self, name: &str) -> u32 {
        self.hdus
            .iter()
            .filter(|hdu| hdu.is_named(name))
            .map(Hdu::extver)
            .max()
            .unwrap_or(0)
    }

    pub fn push(&mut self, hdu: Hdu) -> usize {
        self.hdus.push(hdu);
        self.hdus.len() - 1
    }

    /// Replaces the extension with the same `(EXTNAME, EXTVER)` in place, or
    /// appends `hdu` when there is none.
    pub fn replace_or_push(&mut self, hdu: Hdu) -> usize {
        let existing = hdu
            .extname()
            .and_then(|name| self.find(name, hdu.extver()));
        match existing {
            Some(index) => {
                self.hdus[index] = hdu;
                index
            }
            None => self.push(hdu),
        }
    }

    pub fn remove(&mut self, index: usize) -> Result<Hdu> {
        if index >= self.hdus.len() {
            return Err(HeaderError::ExtensionNotFound(index.to_string()));
        }
        Ok(self.hdus.remove(index))
    }
}
