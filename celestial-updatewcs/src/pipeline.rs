//! The per-file update sequence and the batch driver around it.
//!
//! A file is updated in one scoped pass: the original solution is restored
//! from key `O` (or archived there on the first run), the enabled corrections
//! are applied to every science extension, the result is propagated to the
//! auxiliary extensions and archived under the policy key. Re-running with
//! the same reference files reproduces the same primary keywords.

use std::path::{Path, PathBuf};

use celestial_headers::{Hdu, HduData, HduList, Header, Keyword, OpenMode};
use celestial_wcs::altwcs::{self, ArchiveOptions, ORIGINAL_NAME};
use celestial_wcs::headerlet::NO_MODEL;
use celestial_wcs::select::{extension_label, science_extensions};
use celestial_wcs::tables::{install_table, prune_tables, remove_distortion, table_extver};
use celestial_wcs::{
    DistortionKind, DistortionPayload, ExtSelection, KeyIndex, KeywordProvider, WcsError, WcsKey, WcsRecord,
    WcsResult,
};

use crate::corrections::{select_corrections, Correction};
use crate::extension::{ExtensionWcs, Models};
use crate::instrument::{CorrectionSet, Instrument};
use crate::options::{KeyPolicy, NamePolicy, UpdateOptions};
use crate::reference::{idc_root, is_unset, ReferenceFiles};
use crate::report::RunReport;

/// Extensions that receive the linear part of their science extension's WCS.
pub const AUXILIARY: [&str; 5] = ["ERR", "DQ", "SDQ", "SAMP", "TIME"];
pub const VERSION_KEYWORD: &str = "UPWCSVER";

/// Updates every file in `files` and returns the ones processed.
///
/// With `checkfiles`, inputs that cannot be read are dropped from the batch
/// with a warning. Any error while updating a file is returned at once; that
/// file is left as it was and later files are not touched.
pub fn update<P: AsRef<Path>>(
    files: &[P],
    options: &UpdateOptions,
    references: &dyn ReferenceFiles,
    report: &mut RunReport,
) -> WcsResult<Vec<PathBuf>> {
    options.validate()?;
    let files = prepare(files, options, report);
    if files.is_empty() {
        report.info(None, "no input files to update");
    }

    let mut processed = Vec::with_capacity(files.len());
    for path in files {
        HduList::with_update(&path, |hdul| {
            update_list(hdul, options, references, report, Some(path.as_path()))
        })?;
        report.info(Some(&path), "WCS updated");
        processed.push(path);
    }
    Ok(processed)
}

fn prepare<P: AsRef<Path>>(files: &[P], options: &UpdateOptions, report: &mut RunReport) -> Vec<PathBuf> {
    let mut ready = Vec::with_capacity(files.len());
    for file in files {
        let path = file.as_ref();
        if options.checkfiles {
            if let Err(err) = HduList::open(path, OpenMode::ReadOnly) {
                report.dropped(path, err);
                continue;
            }
        }
        ready.push(path.to_path_buf());
    }
    ready
}

/// Runs the whole update sequence on one open file.
pub fn update_list(
    hdul: &mut HduList,
    options: &UpdateOptions,
    references: &dyn ReferenceFiles,
    report: &mut RunReport,
    file: Option<&Path>,
) -> WcsResult<()> {
    let primary = hdul.hdu(0)?.header.clone();
    let instrument = Instrument::from_header(&primary)?;
    let science = science_extensions(hdul);
    if science.is_empty() {
        return Err(WcsError::argument("file has no science extensions"));
    }
    let corrections = select_corrections(&primary, instrument, options);
    let names: Vec<&str> = Correction::ordered(corrections).map(Correction::name).collect();
    report.info(file, format!("{instrument}: corrections [{}]", names.join(", ")));

    if corrections.contains(CorrectionSet::COMPOSITE_POLYNOMIAL) && idctab_changed(hdul, &primary, science[0])? {
        let removed = altwcs::delete_all_alternates(hdul)?;
        report.warn(file, format!("IDCTAB changed; removed {removed} archived WCS keywords"));
    }
    strip_unset_models(hdul, &primary, &science, report, file)?;
    let models = Models::load(&primary, corrections, references)?;

    restore_baseline(hdul, &science)?;
    altwcs::archive(
        hdul,
        &ExtSelection::Science,
        &WcsKey::ORIGINAL.to_string(),
        &ArchiveOptions::named(ORIGINAL_NAME).reuse(true).allow_reserved(),
    )?;
    if !corrections.contains(CorrectionSet::TIME_DEPENDENT) {
        for &index in &science {
            let header = &mut hdul.hdu_mut(index)?.header;
            header.remove("TDDALPHA");
            header.remove("TDDBETA");
        }
    }

    let reference_index = reference_extension(hdul, instrument, &primary, &science);
    let reference = ExtensionWcs::read(hdul, reference_index, instrument, &models)?;
    tracing::debug!(reference = %extension_label(hdul, reference_index), "reference extension");
    for &index in &science {
        correct_extension(hdul, index, &reference, corrections, instrument, &models)?;
    }

    let plan = ArchivePlan::resolve(&hdul.hdu(science[0])?.header, &primary, options)?;
    for &index in &science {
        hdul.hdu_mut(index)?.header.set("WCSNAME", plan.name.as_str());
    }
    if let Some(key) = plan.key {
        altwcs::archive(
            hdul,
            &ExtSelection::Science,
            &key.to_string(),
            &ArchiveOptions::named(plan.name.as_str()).reuse(plan.reuse),
        )?;
        report.info(file, format!("archived updated WCS under key '{key}' as {}", plan.name));
    }
    propagate(hdul, &science, plan.key)?;
    prune_tables(hdul)?;
    stamp_version(&mut hdul.hdu_mut(0)?.header);
    Ok(())
}

/// True when the primary header names a different polynomial table than the
/// one the science extensions were last computed from.
fn idctab_changed(hdul: &HduList, primary: &Header, first: usize) -> WcsResult<bool> {
    let Some(current) = primary.get_string("IDCTAB") else {
        return Ok(false);
    };
    Ok(match hdul.hdu(first)?.header.get_string("IDCTAB") {
        Some(recorded) => recorded.trim() != current.trim(),
        None => false,
    })
}

/// Removes lookup-table and detector-to-image payloads whose reference file
/// the primary header no longer names.
fn strip_unset_models(
    hdul: &mut HduList,
    primary: &Header,
    science: &[usize],
    report: &mut RunReport,
    file: Option<&Path>,
) -> WcsResult<()> {
    for (keyword, kind) in [("NPOLFILE", DistortionKind::Lookup), ("D2IMFILE", DistortionKind::Det2Im)] {
        if !is_unset(primary.get_string(keyword).as_deref()) {
            continue;
        }
        let removed = remove_distortion(hdul, science, kind)?;
        if removed > 0 {
            report.info(file, format!("{keyword} is not set; removed {removed} {kind:?} keywords"));
        }
    }
    Ok(())
}

fn restore_baseline(hdul: &mut HduList, science: &[usize]) -> WcsResult<()> {
    let mut archived = Vec::with_capacity(science.len());
    for &index in science {
        if KeyIndex::scan(&hdul.hdu(index)?.header).contains(WcsKey::ORIGINAL) {
            archived.push(index);
        }
    }
    if archived.is_empty() {
        return Ok(());
    }
    altwcs::restore(hdul, &ExtSelection::from(archived), &WcsKey::ORIGINAL.to_string(), true)
}

/// The chip the instrument treats as the reference, else the first science
/// extension.
pub fn reference_extension(hdul: &HduList, instrument: Instrument, primary: &Header, science: &[usize]) -> usize {
    let detector = primary.get_string("DETECTOR");
    instrument
        .reference_chip(detector.as_deref())
        .and_then(|(keyword, chip)| {
            science.iter().copied().find(|&index| {
                hdul.hdu(index).ok().and_then(|hdu| hdu.header.get_int(keyword)) == Some(chip)
            })
        })
        .unwrap_or(science[0])
}

fn correct_extension(
    hdul: &mut HduList,
    index: usize,
    reference: &ExtensionWcs,
    corrections: CorrectionSet,
    instrument: Instrument,
    models: &Models,
) -> WcsResult<()> {
    for correction in Correction::ordered(corrections) {
        let ext = ExtensionWcs::read(hdul, index, instrument, models)?;
        let keywords = correction.apply(&ext, reference)?;
        if let Some(kind) = correction.payload_kind() {
            // stale cards of this kind go; the rest are updated in place
            hdul.hdu_mut(index)?.header.retain(|keyword| {
                DistortionKind::of(&keyword.name) != Some(kind) || keywords.get_value(&keyword.name).is_some()
            });
            install_tables(hdul, &ext, kind)?;
        }
        keywords.apply_to(&mut hdul.hdu_mut(index)?.header);
        tracing::debug!(
            extension = %extension_label(hdul, index),
            correction = %correction,
            keywords = keywords.len(),
            "{}",
            correction.description()
        );
    }
    Ok(())
}

fn install_tables(hdul: &mut HduList, ext: &ExtensionWcs, kind: DistortionKind) -> WcsResult<()> {
    let tables = match kind {
        DistortionKind::Lookup => ext.npol.as_ref(),
        DistortionKind::Det2Im => ext.d2im.as_ref(),
        DistortionKind::Sip => None,
    };
    let (Some(tables), Some(extname)) = (tables, kind.table_extname()) else {
        return Ok(());
    };
    for grid in &tables.model.grids {
        let extver = table_extver(ext.extver, grid.axis);
        let mut table = Hdu::extension(extname, extver).with_data(HduData::Image(grid.image()?));
        table.header.set("FILENAME", tables.basename());
        install_table(hdul, extname, extver, table);
    }
    Ok(())
}

/// Key and name the updated solution is archived under.
#[derive(Debug, Clone, PartialEq)]
struct ArchivePlan {
    key: Option<WcsKey>,
    name: String,
    /// The key already holds a solution that may be replaced.
    reuse: bool,
}

impl ArchivePlan {
    fn resolve(first: &Header, primary: &Header, options: &UpdateOptions) -> WcsResult<Self> {
        let name = match &options.wcsname {
            NamePolicy::Auto => default_name(primary.get_string("IDCTAB").as_deref()),
            NamePolicy::Name(name) => name.clone(),
        };
        let registry = KeyIndex::scan(first);
        let named = registry.names().into_iter().find_map(|(key, found)| {
            (!key.is_primary() && !key.is_reserved() && found.as_deref() == Some(name.as_str())).then_some(key)
        });

        let (key, reuse) = match options.wcskey {
            KeyPolicy::Skip => (None, false),
            KeyPolicy::Auto => match named {
                Some(key) => (Some(key), true),
                None => {
                    let key = registry
                        .next_free()
                        .ok_or_else(|| WcsError::key_exhausted("first science extension"))?;
                    (Some(key), false)
                }
            },
            KeyPolicy::Key(c) => {
                let key = WcsKey::new(c)?;
                (Some(key), options.clobber || named == Some(key))
            }
        };
        Ok(Self { key, name, reuse })
    }
}

/// `IDC_` followed by the polynomial table's root name.
pub fn default_name(idctab: Option<&str>) -> String {
    match idctab {
        Some(name) if !is_unset(Some(name)) => format!("IDC_{}", idc_root(name)),
        _ => NO_MODEL.to_string(),
    }
}

/// Gives each auxiliary extension the linear solution of the science
/// extension with the same version.
fn propagate(hdul: &mut HduList, science: &[usize], key: Option<WcsKey>) -> WcsResult<()> {
    for &index in science {
        let hdu = hdul.hdu(index)?;
        let ver = hdu.extver();
        let Some(record) = WcsRecord::read(&hdu.header, WcsKey::PRIMARY) else {
            continue;
        };
        let orientat = match record.linear() {
            Ok(linear) => Some(linear.orientation()),
            Err(err) => {
                tracing::warn!(extension = %extension_label(hdul, index), error = %err, "no linear solution, ORIENTAT not set");
                None
            }
        };
        let linear = record.without_sip_ctype();
        let keyed = key.and_then(|key| Some((key, WcsRecord::read(&hdu.header, key)?.without_sip_ctype())));

        for name in AUXILIARY {
            let Some(target) = hdul.find(name, ver) else {
                continue;
            };
            let header = &mut hdul.hdu_mut(target)?.header;
            linear.replace(header, WcsKey::PRIMARY);
            for kind in DistortionKind::ALL {
                DistortionPayload::strip(header, kind);
            }
            if let Some(orientat) = orientat {
                header.set("ORIENTAT", orientat);
            }
            if let Some((key, record)) = &keyed {
                record.replace(header, *key);
            }
        }
    }
    Ok(())
}

/// Records the software version in the primary header: before the first
/// `HISTORY` card, else after `ASN_MTYP`, else after the last card.
pub fn stamp_version(header: &mut Header) {
    let card = Keyword::string(VERSION_KEYWORD, env!("CARGO_PKG_VERSION"))
        .with_comment("Version of the WCS update software");
    if header.contains(VERSION_KEYWORD) {
        header.set_keyword(card);
    } else if !header.insert_before("HISTORY", card.clone()) && !header.insert_after("ASN_MTYP", card.clone()) {
        let at = header.last_non_blank().map_or(0, |i| i + 1);
        header.insert_at(at, card);
    }
}
