//! Header keyword storage for multi-extension image files.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`header`] | [`Header`], [`Keyword`], [`KeywordValue`]: ordered cards of one extension |
//! | [`hdu`] | [`Hdu`] (header plus optional payload) and [`ExtensionId`] addressing |
//! | [`io`] | [`HduList`]: the extension list of one file, with open modes and atomic writes |
//!
//! The on-disk encoding is JSON; it stands in for the real container format,
//! which this workspace does not implement.

pub mod errors;
pub mod hdu;
pub mod header;
pub mod io;

pub use errors::{HeaderError, Result};
pub use hdu::{ExtensionId, Hdu, HduData, ImageData};
pub use header::{Header, Keyword, KeywordValue};
pub use io::{HduList, OpenMode};
