//! Numerical comparison of WCS solutions across extensions and files.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use celestial_headers::{ExtensionId, HduList, OpenMode};

use crate::error::{WcsError, WcsResult};
use crate::keys::WcsKey;
use crate::record::{DistortionPayload, WcsRecord};
use crate::select::extension_label;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    pub key_a: WcsKey,
    pub key_b: WcsKey,
    /// Absolute tolerance on every numeric field.
    pub tolerance: f64,
    pub compare_ctype: bool,
    pub compare_sip: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            key_a: WcsKey::PRIMARY,
            key_b: WcsKey::PRIMARY,
            tolerance: 1e-10,
            compare_ctype: false,
            compare_sip: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMismatch {
    pub field: String,
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub a: String,
    pub b: String,
    pub mismatches: Vec<FieldMismatch>,
}

impl PairReport {
    pub fn is_identical(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    pub pairs: Vec<PairReport>,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.pairs.iter().all(PairReport::is_identical)
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in &self.pairs {
            let verdict = if pair.is_identical() { "identical" } else { "different" };
            writeln!(f, "{} vs {}: {verdict}", pair.a, pair.b)?;
            for m in &pair.mismatches {
                writeln!(f, "    {}: {} != {}", m.field, m.a, m.b)?;
            }
        }
        Ok(())
    }
}

/// One side of a comparison. SIP keywords are never keyed, so the payload is
/// read from the unkeyed cards whichever key the record comes from.
struct Side {
    record: WcsRecord,
    payload: DistortionPayload,
}

impl Side {
    fn read(hdul: &HduList, id: &ExtensionId, key: WcsKey) -> WcsResult<Self> {
        let index = hdul.index_of(id)?;
        let header = &hdul.hdu(index)?.header;
        let record = WcsRecord::read(header, key)
            .ok_or_else(|| WcsError::key_not_found(key.as_char(), extension_label(hdul, index)))?;
        Ok(Self {
            record,
            payload: DistortionPayload::read(header),
        })
    }
}

/// Compares extension `exts_a[i]` of `a` with `exts_b[i]` of `b` for every `i`.
pub fn is_identical(
    a: &HduList,
    exts_a: &[ExtensionId],
    b: &HduList,
    exts_b: &[ExtensionId],
    options: &DiffOptions,
) -> WcsResult<(bool, DiffReport)> {
    if exts_a.len() != exts_b.len() {
        return Err(WcsError::argument(format!(
            "extension lists differ in length ({} vs {})",
            exts_a.len(),
            exts_b.len()
        )));
    }
    let mut report = DiffReport::default();
    for (id_a, id_b) in exts_a.iter().zip(exts_b) {
        let side_a = Side::read(a, id_a, options.key_a)?;
        let side_b = Side::read(b, id_b, options.key_b)?;
        let mismatches = compare(&side_a, &side_b, options)?;
        tracing::debug!(a = %id_a, b = %id_b, mismatches = mismatches.len(), "compared WCS");
        report.pairs.push(PairReport {
            a: id_a.to_string(),
            b: id_b.to_string(),
            mismatches,
        });
    }
    Ok((report.is_identical(), report))
}

/// Opens both files read-only and compares them.
pub fn is_identical_files<P: AsRef<Path>, Q: AsRef<Path>>(
    a: P,
    exts_a: &[ExtensionId],
    b: Q,
    exts_b: &[ExtensionId],
    options: &DiffOptions,
) -> WcsResult<(bool, DiffReport)> {
    let a = HduList::open(a, OpenMode::ReadOnly)?;
    let b = HduList::open(b, OpenMode::ReadOnly)?;
    is_identical(&a, exts_a, &b, exts_b, options)
}

fn compare(a: &Side, b: &Side, options: &DiffOptions) -> WcsResult<Vec<FieldMismatch>> {
    let mut mismatches = Vec::new();
    let tol = options.tolerance;

    let (crpix_a, crpix_b) = (a.record.crpix()?, b.record.crpix()?);
    let (crval_a, crval_b) = (a.record.crval()?, b.record.crval()?);
    let (cd_a, cd_b) = (a.record.cd()?, b.record.cd()?);
    for i in 0..2 {
        numeric(&mut mismatches, &format!("CRPIX{}", i + 1), crpix_a[i], crpix_b[i], tol);
        numeric(&mut mismatches, &format!("CRVAL{}", i + 1), crval_a[i], crval_b[i], tol);
        for j in 0..2 {
            numeric(&mut mismatches, &format!("CD{}_{}", i + 1, j + 1), cd_a[i][j], cd_b[i][j], tol);
        }
    }

    if options.compare_ctype {
        for (i, (ta, tb)) in a.record.ctype().iter().zip(b.record.ctype()).enumerate() {
            if *ta != tb {
                mismatches.push(FieldMismatch {
                    field: format!("CTYPE{}", i + 1),
                    a: format!("{ta:?}"),
                    b: format!("{tb:?}"),
                });
            }
        }
    }

    if options.compare_sip && (!a.payload.is_empty() || !b.payload.is_empty()) {
        if a.payload.sip_order() != b.payload.sip_order() {
            mismatches.push(FieldMismatch {
                field: "SIP order".to_string(),
                a: format!("{:?}", a.payload.sip_order()),
                b: format!("{:?}", b.payload.sip_order()),
            });
        }
        let coeff_a = a.payload.sip_coefficients();
        let coeff_b = b.payload.sip_coefficients();
        let names: BTreeSet<&str> = coeff_a
            .iter()
            .chain(&coeff_b)
            .map(|(name, _)| *name)
            .collect();
        let lookup = |coeffs: &[(&str, f64)], name: &str| {
            coeffs
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
                .unwrap_or(0.0)
        };
        for name in names {
            numeric(&mut mismatches, name, lookup(&coeff_a, name), lookup(&coeff_b, name), tol);
        }
    }

    Ok(mismatches)
}

fn numeric(out: &mut Vec<FieldMismatch>, field: &str, a: f64, b: f64, tolerance: f64) {
    if (a - b).abs() > tolerance || a.is_nan() != b.is_nan() {
        out.push(FieldMismatch {
            field: field.to_string(),
            a: format!("{a:e}"),
            b: format!("{b:e}"),
        });
    }
}
