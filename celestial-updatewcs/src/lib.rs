//! Recomputes the WCS of science files from their distortion reference files.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pipeline`] | the per-file update sequence and the batch driver [`update`] |
//! | [`corrections`] | the [`Correction`] set, its order and per-file selection |
//! | [`instrument`] | supported instruments and their [`CorrectionSet`] |
//! | [`extension`] | [`ExtensionWcs`], the input every correction computes from |
//! | [`reference`] | polynomial and lookup reference files behind [`ReferenceFiles`] |
//! | [`options`] | [`UpdateOptions`], loadable from JSON |
//! | [`report`] | [`RunReport`], the per-run log handed back to callers |
//!
//! ```no_run
//! use celestial_updatewcs::{update, ReferenceDirectory, RunReport, UpdateOptions};
//!
//! let references = ReferenceDirectory::new("/data/jref");
//! let mut report = RunReport::new();
//! let files = ["j94f05bgq_flt.json"];
//! update(&files, &UpdateOptions::default(), &references, &mut report)?;
//! for entry in report.finish() {
//!     println!("{entry}");
//! }
//! # Ok::<(), celestial_wcs::WcsError>(())
//! ```

pub mod corrections;
pub mod extension;
pub mod instrument;
pub mod options;
pub mod pipeline;
pub mod reference;
pub mod report;

pub use corrections::{corrections_for, select_corrections, Correction};
pub use extension::{ExtensionWcs, Models};
pub use instrument::{CorrectionSet, Instrument};
pub use options::{KeyPolicy, NamePolicy, UpdateOptions};
pub use pipeline::{update, update_list};
pub use reference::{IdcRow, IdcTable, LookupChip, LookupGrid, LookupTable, ReferenceCatalog, ReferenceDirectory, ReferenceFiles};
pub use report::{ReportEntry, RunReport, Severity};
