//! Run options of an update, loadable from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use celestial_wcs::{WcsError, WcsKey, WcsResult};
use serde::{Deserialize, Serialize};

/// Where the updated primary solution is archived.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Leave the updated solution unarchived.
    Skip,
    /// The key already carrying the archive name, else the next free key.
    #[default]
    Auto,
    Key(char),
}

/// `WCSNAME` given to the archived solution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamePolicy {
    /// `IDC_` followed by the distortion table's root name.
    #[default]
    Auto,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub vacorr: bool,
    pub tddcorr: bool,
    pub npolcorr: bool,
    pub d2imcorr: bool,
    /// Drop unreadable inputs from a batch instead of failing on them.
    pub checkfiles: bool,
    pub wcskey: KeyPolicy,
    pub wcsname: NamePolicy,
    /// Overwrite an explicitly requested key that is already in use.
    pub clobber: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            vacorr: true,
            tddcorr: true,
            npolcorr: true,
            d2imcorr: true,
            checkfiles: true,
            wcskey: KeyPolicy::Auto,
            wcsname: NamePolicy::Auto,
            clobber: false,
        }
    }
}

impl UpdateOptions {
    pub fn from_json_str(text: &str) -> WcsResult<Self> {
        let options: Self = serde_json::from_str(text).map_err(std::io::Error::from)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> WcsResult<Self> {
        let file = File::open(path)?;
        let options: Self = serde_json::from_reader(BufReader::new(file)).map_err(std::io::Error::from)?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects an explicit key that cannot hold an updated solution.
    pub fn validate(&self) -> WcsResult<()> {
        if let KeyPolicy::Key(c) = self.wcskey {
            let key = WcsKey::new(c)?;
            if key.is_primary() || key.is_reserved() {
                return Err(WcsError::argument(format!(
                    "key '{key}' cannot hold the updated solution"
                )));
            }
        }
        if let NamePolicy::Name(name) = &self.wcsname {
            if name.trim().is_empty() {
                return Err(WcsError::argument("empty WCS name"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let options = UpdateOptions::default();
        assert!(options.vacorr && options.tddcorr && options.npolcorr && options.d2imcorr);
        assert_eq!(options.wcskey, KeyPolicy::Auto);
        assert_eq!(options.wcsname, NamePolicy::Auto);
        assert!(!options.clobber);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options = UpdateOptions::from_json_str(r#"{"vacorr": false, "wcskey": {"key": "B"}}"#).unwrap();
        assert!(!options.vacorr);
        assert!(options.npolcorr);
        assert_eq!(options.wcskey, KeyPolicy::Key('B'));
    }

    #[test]
    fn policies_parse() {
        let options = UpdateOptions::from_json_str(r#"{"wcskey": "skip", "wcsname": {"name": "MINE"}}"#).unwrap();
        assert_eq!(options.wcskey, KeyPolicy::Skip);
        assert_eq!(options.wcsname, NamePolicy::Name("MINE".into()));
    }

    #[test]
    fn reserved_and_bad_keys_rejected() {
        for text in [r#"{"wcskey": {"key": "O"}}"#, r#"{"wcskey": {"key": " "}}"#, r#"{"wcskey": {"key": "1"}}"#] {
            let err = UpdateOptions::from_json_str(text).unwrap_err();
            assert!(matches!(err, WcsError::Argument { .. }), "{text}");
        }
    }

    #[test]
    fn malformed_json_is_io() {
        assert!(UpdateOptions::from_json_str("{not json").unwrap_err().is_io());
    }

    #[test]
    fn from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"clobber": true}"#).unwrap();
        assert!(UpdateOptions::from_json_file(&path).unwrap().clobber);
    }
}
