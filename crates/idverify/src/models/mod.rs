//! Data model shared by every pipeline stage.
//!
//! - [`IdDocument`] - structured document returned by the extraction oracle
//! - [`FieldCheck`] - per-field comparison outcome ([`FieldComparisonResult`],
//!   [`NameComparisonResult`], [`AddressComparisonResult`])
//! - [`FaceVerifyResult`] - photo comparison outcome
//! - [`ComparisonReport`] - the merged, serializable result of one request

mod comparison;
mod id_document;
mod report;

pub use comparison::{
    AddressComparisonResult, ComparisonVerdict, FieldCheck, FieldChecks, FieldComparisonResult,
    NameComparisonResult,
};
pub use id_document::{DocumentType, IdDocument};
pub use report::{
    ComparisonReport, DocumentVisualAnalysis, FaceVerifyResult, LogEntry, LogType,
    NO_FACES_ERROR, NO_RECORD_PHOTO_ERROR,
};
