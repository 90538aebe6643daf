//! Archive, restore and delete alternate WCS records across extensions.
//!
//! Every operation validates the key and resolves all extensions before it
//! touches a header. The `*_file` variants open the file for update and
//! persist only when the whole operation succeeds.

use std::path::Path;

use celestial_headers::HduList;

use crate::error::{WcsError, WcsResult};
use crate::keys::{KeyIndex, WcsKey};
use crate::record::WcsRecord;
use crate::select::{extension_label, ExtSelection, SCIENCE};

/// Name recorded with the solution a file arrived with.
pub const ORIGINAL_NAME: &str = "OPUS";

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// `WCSNAME` for the archived copy; the primary's name is kept when `None`.
    pub name: Option<String>,
    /// Replace a record already stored under the key.
    pub reuse: bool,
    /// Permit the reserved key `O` and name `OPUS`.
    pub allow_reserved: bool,
}

impl ArchiveOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn allow_reserved(mut self) -> Self {
        self.allow_reserved = true;
        self
    }
}

/// Validates `key` and the target without modifying anything. Returns the
/// parsed key and the resolved extension indexes.
pub fn check_parameters(
    hdul: &HduList,
    extensions: &ExtSelection,
    key: &str,
) -> WcsResult<(WcsKey, Vec<usize>)> {
    let key: WcsKey = key.parse()?;
    if !hdul.is_writable() {
        return Err(WcsError::argument("file is not open for update"));
    }
    let indexes = extensions.resolve(hdul)?;
    Ok((key, indexes))
}

/// Copies the primary record of every selected extension under `key`.
pub fn archive(
    hdul: &mut HduList,
    extensions: &ExtSelection,
    key: &str,
    options: &ArchiveOptions,
) -> WcsResult<()> {
    let (key, indexes) = check_parameters(hdul, extensions, key)?;
    if key.is_primary() {
        return Err(WcsError::argument("cannot archive onto the primary key"));
    }
    let reserved_name = options.name.as_deref() == Some(ORIGINAL_NAME);
    if (key.is_reserved() || reserved_name) && !options.allow_reserved {
        return Err(WcsError::argument(format!(
            "key '{}' and name '{ORIGINAL_NAME}' are reserved for the original solution",
            WcsKey::ORIGINAL
        )));
    }

    let mut pending = Vec::with_capacity(indexes.len());
    for &index in &indexes {
        let label = extension_label(hdul, index);
        let registry = KeyIndex::scan(&hdul.hdu(index)?.header);
        if registry.contains(key) && !options.reuse {
            return Err(WcsError::key_collision(key.as_char(), label));
        }
        let mut record = registry
            .get(WcsKey::PRIMARY)
            .cloned()
            .ok_or_else(|| WcsError::key_not_found(' ', label))?;
        if let Some(name) = &options.name {
            record.set_name(name);
        }
        pending.push((index, record));
    }

    for (index, record) in pending {
        record.replace(&mut hdul.hdu_mut(index)?.header, key);
        tracing::debug!(
            extension = %extension_label(hdul, index),
            key = %key,
            name = record.name().unwrap_or(""),
            "archived primary WCS"
        );
    }
    Ok(())
}

/// Copies the record at `key` into the primary slot. With `clobber_primary`
/// primary record keywords the stored record lacks are removed.
pub fn restore(
    hdul: &mut HduList,
    extensions: &ExtSelection,
    key: &str,
    clobber_primary: bool,
) -> WcsResult<()> {
    let (key, indexes) = check_parameters(hdul, extensions, key)?;
    if key.is_primary() {
        return Err(WcsError::argument("cannot restore from the primary key"));
    }
    for index in indexes {
        let label = extension_label(hdul, index);
        let header = &mut hdul.hdu_mut(index)?.header;
        let record = WcsRecord::read(header, key)
            .ok_or_else(|| WcsError::key_not_found(key.as_char(), label.as_str()))?;
        if clobber_primary {
            record.replace(header, WcsKey::PRIMARY);
        } else {
            record.write(header, WcsKey::PRIMARY);
        }
        tracing::debug!(extension = %label, key = %key, "restored WCS into primary");
    }
    Ok(())
}

/// Restores the record at `key` of every `from` extension into the primary
/// slot of each `to` extension with the same version. Non-science targets get
/// their axis types without the `-SIP` suffix.
pub fn restore_from_to(hdul: &mut HduList, from: &str, to: &[&str], key: &str) -> WcsResult<()> {
    let key: WcsKey = key.parse()?;
    if !hdul.is_writable() {
        return Err(WcsError::argument("file is not open for update"));
    }
    if key.is_primary() {
        return Err(WcsError::argument("cannot restore from the primary key"));
    }
    let sources = hdul.indices_named(from);
    if sources.is_empty() {
        return Err(WcsError::argument(format!("no '{from}' extensions")));
    }

    for source in sources {
        let ver = hdul.hdu(source)?.extver();
        let record = WcsRecord::read(&hdul.hdu(source)?.header, key)
            .ok_or_else(|| WcsError::key_not_found(key.as_char(), extension_label(hdul, source)))?;
        for name in to {
            let Some(target) = hdul.find(name, ver) else {
                continue;
            };
            let restored = if name.eq_ignore_ascii_case(SCIENCE) {
                record.clone()
            } else {
                record.without_sip_ctype()
            };
            restored.replace(&mut hdul.hdu_mut(target)?.header, WcsKey::PRIMARY);
            tracing::debug!(extension = %extension_label(hdul, target), key = %key, "restored WCS");
        }
    }
    Ok(())
}

/// Removes the record at `key` from every selected extension.
pub fn delete(hdul: &mut HduList, extensions: &ExtSelection, key: &str) -> WcsResult<()> {
    let (key, indexes) = check_parameters(hdul, extensions, key)?;
    if key.is_primary() {
        return Err(WcsError::argument("the primary WCS cannot be deleted"));
    }
    for &index in &indexes {
        if WcsRecord::read(&hdul.hdu(index)?.header, key).is_none() {
            return Err(WcsError::key_not_found(
                key.as_char(),
                extension_label(hdul, index),
            ));
        }
    }
    for index in indexes {
        let removed = WcsRecord::erase(&mut hdul.hdu_mut(index)?.header, key);
        tracing::debug!(extension = %extension_label(hdul, index), key = %key, removed, "deleted WCS");
    }
    Ok(())
}

/// Lowest free alternate key of one extension.
pub fn next_key(hdul: &HduList, index: usize) -> WcsResult<WcsKey> {
    KeyIndex::scan(&hdul.hdu(index)?.header)
        .next_free()
        .ok_or_else(|| WcsError::key_exhausted(extension_label(hdul, index)))
}

/// Deletes every alternate record of every extension.
pub fn delete_all_alternates(hdul: &mut HduList) -> WcsResult<usize> {
    let mut removed = 0;
    for index in 0..hdul.len() {
        let header = &mut hdul.hdu_mut(index)?.header;
        for key in KeyIndex::scan(header).keys() {
            if !key.is_primary() {
                removed += WcsRecord::erase(header, key);
            }
        }
    }
    Ok(removed)
}

pub fn archive_file<P: AsRef<Path>>(
    path: P,
    extensions: &ExtSelection,
    key: &str,
    options: &ArchiveOptions,
) -> WcsResult<()> {
    HduList::with_update(path, |hdul| archive(hdul, extensions, key, options))
}

pub fn restore_file<P: AsRef<Path>>(
    path: P,
    extensions: &ExtSelection,
    key: &str,
    clobber_primary: bool,
) -> WcsResult<()> {
    HduList::with_update(path, |hdul| restore(hdul, extensions, key, clobber_primary))
}

pub fn delete_file<P: AsRef<Path>>(path: P, extensions: &ExtSelection, key: &str) -> WcsResult<()> {
    HduList::with_update(path, |hdul| delete(hdul, extensions, key))
}
