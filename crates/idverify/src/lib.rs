//! Identity document verification.
//!
//! Given an uploaded ID document and a customer id, the pipeline:
//!
//! 1. normalizes the upload into page images ([`ingest`])
//! 2. extracts a structured [`models::IdDocument`] with a vision-capable
//!    language model ([`extract`], [`llm`])
//! 3. reconciles the extracted fields against the stored customer record
//!    ([`reconcile`]) while comparing the document photo with the photo on
//!    record ([`face`])
//! 4. merges both verdicts into a [`models::ComparisonReport`] ([`aggregate`])
//!
//! ```no_run
//! use idverify::config::Settings;
//! use idverify::pipeline::VerificationPipeline;
//!
//! # async fn example() -> idverify::Result<()> {
//! let settings = Settings::load(None)?;
//! let pipeline = VerificationPipeline::from_settings(&settings)?;
//!
//! let bytes = std::fs::read("passport.png")?;
//! let report = pipeline.submit("customer-42", "passport.png", &bytes).await?;
//! println!("fields ok: {}", report.data_fields_status);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extract;
pub mod face;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod reconcile;

pub use error::{Result, Stage, VerifyError};
pub use pipeline::{Services, VerificationPipeline};
