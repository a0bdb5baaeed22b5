//! Optical mark recognition for photographed bubble sheets.
//!
//! [`pipeline::scan_sheet`] takes the bytes of one uploaded photo and a
//! [`template::SheetTemplate`] and returns the decoded sheet identifier and
//! one answer per question. Everything in between is deterministic: the
//! same bytes and template always give the same result.

pub mod classify;
pub mod config;
pub mod debug;
pub mod errors;
pub mod fiducial;
pub mod grid;
pub mod identifier;
pub mod image;
pub mod layout;
pub mod pipeline;
pub mod state;
pub mod template;
pub mod warp;

pub use classify::AnswerResult;
pub use errors::ScanError;
pub use pipeline::{scan_sheet, ScanOptions, ScanResponse, ScanResult};
pub use template::SheetTemplate;
