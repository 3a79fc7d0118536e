//! Field-by-field reconciliation of an extracted document against the stored
//! customer record.
//!
//! Every schema field is visited in declaration order. Fields that can be
//! settled locally (absent on either side, excluded, or literally equal) never
//! reach the language model. The rest are planned as [`ComparisonRequest`]s:
//! one per mismatched address or scalar field, and at most one for all three
//! name parts together. The planned requests run concurrently and their
//! results are merged back in field order, so completion order never shows.
//!
//! A comparison that fails degrades its field to `ToBeChecked`; a pass
//! always completes.

use async_trait::async_trait;
use futures::future::join_all;
use idverify_storage::Record;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{complete_structured, LanguageModel, LlmError};
use crate::models::{
    AddressComparisonResult, ComparisonVerdict, FieldCheck, FieldChecks, FieldComparisonResult,
    IdDocument, NameComparisonResult,
};
use crate::prompts::{render, PromptTemplates};

const NAME_FIELDS: [&str; 3] = ["first_name", "middle_name", "last_name"];
const ADDRESS_FIELD: &str = "address";
const EXCLUDED_FIELDS: [&str; 5] = [
    "photo",
    "signature",
    "additional_attributes",
    "document_type",
    "file_url",
];

/// How a field is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// Not an equality check (photos, metadata, signed URLs)
    Excluded,
    /// Part of the full name, compared as one unit
    Name,
    /// Free-text address
    Address,
    /// Any other single value
    Scalar,
}

#[must_use]
pub fn classify(field: &str) -> FieldClass {
    if EXCLUDED_FIELDS.contains(&field) || field.ends_with("_sas") {
        FieldClass::Excluded
    } else if NAME_FIELDS.contains(&field) {
        FieldClass::Name
    } else if field == ADDRESS_FIELD {
        FieldClass::Address
    } else {
        FieldClass::Scalar
    }
}

/// A comparison the reconciler could not settle locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonRequest {
    Name {
        name1: String,
        name2: String,
    },
    Address {
        address1: String,
        address2: String,
    },
    Field {
        field_name: String,
        field1: String,
        field2: String,
    },
}

impl ComparisonRequest {
    /// The check recorded when this comparison could not be made
    #[must_use]
    pub fn degraded(&self) -> FieldCheck {
        let result = ComparisonVerdict::ToBeChecked;
        match self.clone() {
            Self::Name { name1, name2 } => NameComparisonResult {
                name1,
                name2,
                result,
            }
            .into(),
            Self::Address { address1, address2 } => AddressComparisonResult {
                address1,
                address2,
                result,
            }
            .into(),
            Self::Field { field1, field2, .. } => FieldComparisonResult {
                field1,
                field2,
                result,
            }
            .into(),
        }
    }
}

/// Strategy deciding the comparisons that need judgement
#[async_trait]
pub trait FieldComparator: Send + Sync {
    async fn compare(&self, request: &ComparisonRequest) -> Result<FieldCheck, LlmError>;
}

/// Comparator asking the language model, one schema-constrained call per request
#[derive(Clone)]
pub struct LlmFieldComparator {
    model: Arc<dyn LanguageModel>,
    prompts: PromptTemplates,
}

impl LlmFieldComparator {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: PromptTemplates) -> Self {
        Self { model, prompts }
    }
}

#[async_trait]
impl FieldComparator for LlmFieldComparator {
    async fn compare(&self, request: &ComparisonRequest) -> Result<FieldCheck, LlmError> {
        let model = self.model.as_ref();
        match request {
            ComparisonRequest::Name { name1, name2 } => {
                let prompt = render(
                    &self.prompts.name_comparison,
                    &[("name1", name1), ("name2", name2)],
                );
                complete_structured::<NameComparisonResult>(model, &prompt, &[])
                    .await
                    .map(FieldCheck::from)
            }
            ComparisonRequest::Address { address1, address2 } => {
                let prompt = render(
                    &self.prompts.address_comparison,
                    &[("address1", address1), ("address2", address2)],
                );
                complete_structured::<AddressComparisonResult>(model, &prompt, &[])
                    .await
                    .map(FieldCheck::from)
            }
            ComparisonRequest::Field {
                field_name,
                field1,
                field2,
            } => {
                let prompt = render(
                    &self.prompts.field_comparison,
                    &[("field_name", field_name), ("field1", field1), ("field2", field2)],
                );
                complete_structured::<FieldComparisonResult>(model, &prompt, &[])
                    .await
                    .map(FieldCheck::from)
            }
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Present name parts joined by single spaces
fn full_name(parts: [Option<&Value>; 3]) -> String {
    parts
        .into_iter()
        .flatten()
        .map(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

enum Slot {
    Settled(FieldCheck),
    Pending(usize),
}

/// Plans, runs and merges the comparisons of one document pair
#[derive(Clone)]
pub struct FieldReconciler {
    comparator: Arc<dyn FieldComparator>,
}

impl FieldReconciler {
    pub fn new(comparator: Arc<dyn FieldComparator>) -> Self {
        Self { comparator }
    }

    /// Compare every present, non-excluded field of `extracted` with `stored`
    pub async fn reconcile(&self, extracted: &IdDocument, stored: &Record) -> FieldChecks {
        let (slots, requests) = plan(extracted, stored);
        debug!(
            "{} field(s) to report, {} comparison call(s)",
            slots.len(),
            requests.len()
        );

        let outcomes = join_all(requests.iter().map(|r| self.comparator.compare(r))).await;
        let resolved: Vec<FieldCheck> = requests
            .iter()
            .zip(outcomes)
            .map(|(request, outcome)| match outcome {
                Ok(check) => check,
                Err(e) => {
                    warn!("Comparison {:?} failed, marking for review: {}", request, e);
                    request.degraded()
                }
            })
            .collect();

        let mut checks = FieldChecks::new();
        for (field, slot) in slots {
            let check = match slot {
                Slot::Settled(check) => check,
                Slot::Pending(i) => resolved[i].clone(),
            };
            checks.push(field, check);
        }

        info!(
            "Reconciled {} field(s), all same: {}",
            checks.len(),
            checks.all_same()
        );
        checks
    }
}

/// Settle what can be settled locally and collect the rest as requests
fn plan(extracted: &IdDocument, stored: &Record) -> (Vec<(String, Slot)>, Vec<ComparisonRequest>) {
    let doc = extracted.to_map();
    let mut slots = Vec::new();
    let mut requests = Vec::new();
    let mut name_request: Option<usize> = None;

    for field in IdDocument::FIELD_NAMES {
        let Some(value) = present(doc.get(field)) else {
            continue;
        };
        let class = classify(field);
        if class == FieldClass::Excluded {
            continue;
        }

        let extracted_text = value_text(value);
        let Some(stored_value) = present(stored.get(field)) else {
            slots.push((
                field.to_string(),
                Slot::Settled(FieldCheck::field(
                    extracted_text,
                    "None",
                    ComparisonVerdict::Different,
                )),
            ));
            continue;
        };
        let stored_text = value_text(stored_value);

        if extracted_text == stored_text {
            slots.push((
                field.to_string(),
                Slot::Settled(FieldCheck::field(
                    extracted_text,
                    stored_text,
                    ComparisonVerdict::Same,
                )),
            ));
            continue;
        }

        let index = match class {
            FieldClass::Name => *name_request.get_or_insert_with(|| {
                requests.push(ComparisonRequest::Name {
                    name1: full_name(NAME_FIELDS.map(|f| present(doc.get(f)))),
                    name2: full_name(NAME_FIELDS.map(|f| present(stored.get(f)))),
                });
                requests.len() - 1
            }),
            FieldClass::Address => {
                requests.push(ComparisonRequest::Address {
                    address1: extracted_text,
                    address2: stored_text,
                });
                requests.len() - 1
            }
            FieldClass::Scalar | FieldClass::Excluded => {
                requests.push(ComparisonRequest::Field {
                    field_name: field.to_string(),
                    field1: extracted_text,
                    field2: stored_text,
                });
                requests.len() - 1
            }
        };
        slots.push((field.to_string(), Slot::Pending(index)));
    }

    (slots, requests)
}
