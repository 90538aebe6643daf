//! Alternate World Coordinate System bookkeeping for multi-extension images.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`keys`] | [`WcsKey`] and the per-header [`KeyIndex`] registry |
//! | [`record`] | [`WcsRecord`] and the unkeyed [`DistortionPayload`] |
//! | [`altwcs`] | archive, restore, delete across extensions |
//! | [`diff`] | numerical comparison of two solutions |
//! | [`headerlet`] | portable [`Headerlet`] packages |
//! | [`tables`] | lookup-table extensions referenced by payloads |

pub mod altwcs;
pub mod diff;
pub mod error;
pub mod header;
pub mod headerlet;
pub mod keys;
pub mod linear;
pub mod record;
pub mod select;
pub mod tables;

pub use altwcs::{archive, check_parameters, delete, restore, restore_from_to, ArchiveOptions};
pub use diff::{is_identical, is_identical_files, DiffOptions, DiffReport};
pub use error::{WcsError, WcsResult};
pub use header::{KeywordMap, KeywordProvider};
pub use headerlet::{attached_headerlets, extract_headerlet, CreateOptions, Headerlet};
pub use keys::{key_for_name, list_keys, next_free_key, KeyIndex, WcsKey};
pub use linear::LinearTransform;
pub use record::{DistortionKind, DistortionPayload, WcsRecord};
pub use select::ExtSelection;
