//! Distortion reference files.
//!
//! Headers name reference files as `prefix$file` (for example
//! `jref$qbu1641sj_idc.fits`). [`ReferenceDirectory`] resolves the prefix
//! through the environment variable of the same name and falls back to its
//! own root; [`ReferenceCatalog`] serves models held in memory.
//!
//! The encoding of a model is JSON; the numerical content of the models is
//! opaque to the pipeline beyond the accessors here.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use celestial_headers::ImageData;
use celestial_wcs::headerlet::model_basename;
use celestial_wcs::{WcsError, WcsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// True when a model keyword value names no file.
pub fn is_unset(value: Option<&str>) -> bool {
    value.map_or(true, |v| {
        let v = v.trim();
        v.is_empty() || v.eq_ignore_ascii_case("N/A")
    })
}

/// Root of a polynomial table name: the base name up to `_idc.fits`.
pub fn idc_root(name: &str) -> &str {
    let base = model_basename(name);
    base.split("_idc.fits").next().unwrap_or(base)
}

/// One chip of a polynomial distortion table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdcRow {
    pub chip: i64,
    pub order: usize,
    /// Arcseconds per pixel.
    pub scale: f64,
    pub refpix: [f64; 2],
    pub v2ref: f64,
    pub v3ref: f64,
    /// Chip rotation in the telescope frame, degrees.
    pub theta: f64,
    /// `cx[n][m]` multiplies `x^m * y^(n-m)`; arcseconds.
    pub cx: Vec<Vec<f64>>,
    pub cy: Vec<Vec<f64>>,
}

impl IdcRow {
    pub fn cx(&self, n: usize, m: usize) -> f64 {
        coefficient(&self.cx, n, m)
    }

    pub fn cy(&self, n: usize, m: usize) -> f64 {
        coefficient(&self.cy, n, m)
    }

    /// Linear part `[[cx11, cx10], [cy11, cy10]]`.
    pub fn linear(&self) -> [[f64; 2]; 2] {
        [[self.cx(1, 1), self.cx(1, 0)], [self.cy(1, 1), self.cy(1, 0)]]
    }

    /// Coefficients with the linear map `m` applied to every `(cx, cy)` pair.
    pub fn transformed(&self, m: [[f64; 2]; 2]) -> Self {
        let mut row = self.clone();
        for n in 0..=self.order {
            for k in 0..=n {
                let (x, y) = (self.cx(n, k), self.cy(n, k));
                set_coefficient(&mut row.cx, n, k, m[0][0] * x + m[0][1] * y);
                set_coefficient(&mut row.cy, n, k, m[1][0] * x + m[1][1] * y);
            }
        }
        row
    }
}

fn coefficient(c: &[Vec<f64>], n: usize, m: usize) -> f64 {
    c.get(n).and_then(|row| row.get(m)).copied().unwrap_or(0.0)
}

fn set_coefficient(c: &mut Vec<Vec<f64>>, n: usize, m: usize, value: f64) {
    if c.len() <= n {
        c.resize(n + 1, Vec::new());
    }
    if c[n].len() <= m {
        c[n].resize(m + 1, 0.0);
    }
    c[n][m] = value;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdcTable {
    pub rows: Vec<IdcRow>,
}

impl IdcTable {
    pub fn row(&self, chip: i64) -> Option<&IdcRow> {
        self.rows.iter().find(|row| row.chip == chip)
    }
}

/// Correction grid for one axis of one chip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupGrid {
    pub axis: u32,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl LookupGrid {
    pub fn image(&self) -> WcsResult<ImageData> {
        ImageData::new(self.shape.clone(), self.values.clone()).ok_or_else(|| {
            WcsError::model_mismatch(format!(
                "grid for axis {} has {} values for shape {:?}",
                self.axis,
                self.values.len(),
                self.shape
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupChip {
    pub chip: i64,
    pub grids: Vec<LookupGrid>,
}

/// Lookup-table or detector-to-image reference file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LookupTable {
    pub chips: Vec<LookupChip>,
}

impl LookupTable {
    pub fn chip(&self, chip: i64) -> Option<&LookupChip> {
        self.chips.iter().find(|c| c.chip == chip)
    }
}

pub trait ReferenceFiles {
    fn idc_table(&self, name: &str) -> WcsResult<IdcTable>;
    fn lookup_table(&self, name: &str) -> WcsResult<LookupTable>;
}

/// Reference files on disk.
#[derive(Debug, Clone)]
pub struct ReferenceDirectory {
    root: PathBuf,
}

impl ReferenceDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of `name`: `prefix$file` goes to `$prefix/file` when the
    /// variable is set, everything else to the root.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let name = name.trim();
        if let Some((prefix, file)) = name.split_once('$') {
            if let Some(dir) = std::env::var_os(prefix) {
                return Path::new(&dir).join(file);
            }
            return self.root.join(file);
        }
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> WcsResult<T> {
        let path = self.resolve(name);
        let file = File::open(&path).map_err(|err| {
            io::Error::new(err.kind(), format!("reference file {}: {err}", path.display()))
        })?;
        let model = serde_json::from_reader(BufReader::new(file)).map_err(io::Error::from)?;
        tracing::debug!(path = %path.display(), "loaded reference file");
        Ok(model)
    }
}

impl ReferenceFiles for ReferenceDirectory {
    fn idc_table(&self, name: &str) -> WcsResult<IdcTable> {
        self.load(name)
    }

    fn lookup_table(&self, name: &str) -> WcsResult<LookupTable> {
        self.load(name)
    }
}

/// Reference files held in memory, keyed by base name.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    idc: HashMap<String, IdcTable>,
    lookup: HashMap<String, LookupTable>,
}

impl ReferenceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idc(mut self, name: &str, table: IdcTable) -> Self {
        self.idc.insert(model_basename(name).to_string(), table);
        self
    }

    pub fn with_lookup(mut self, name: &str, table: LookupTable) -> Self {
        self.lookup.insert(model_basename(name).to_string(), table);
        self
    }
}

fn not_found(name: &str) -> WcsError {
    WcsError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("reference file {name} not found"),
    ))
}

impl ReferenceFiles for ReferenceCatalog {
    fn idc_table(&self, name: &str) -> WcsResult<IdcTable> {
        self.idc.get(model_basename(name)).cloned().ok_or_else(|| not_found(name))
    }

    fn lookup_table(&self, name: &str) -> WcsResult<LookupTable> {
        self.lookup.get(model_basename(name)).cloned().ok_or_else(|| not_found(name))
    }
}
