//! Merging field checks and the photo verdict into one report.

use serde_json::Map;

use crate::error::Result;
use crate::models::{
    ComparisonReport, DocumentVisualAnalysis, FaceVerifyResult, FieldChecks, IdDocument, LogEntry,
};

const PHOTOS_MATCH: &str = "The photos match.";
const PHOTOS_DIFFER: &str = "Photos don't match";

/// Build the report for one request.
///
/// Log entries follow the field evaluation order, then one entry for the
/// photo comparison.
///
/// # Errors
/// Returns an error only if a field check cannot be serialized.
pub fn aggregate(
    checks: &FieldChecks,
    face_result: FaceVerifyResult,
    extracted: &IdDocument,
    visual_analysis: DocumentVisualAnalysis,
) -> Result<ComparisonReport> {
    let mut data_fields_checks = Map::with_capacity(checks.len());
    let mut log_checks = Vec::with_capacity(checks.len() + 1);

    for (field, check) in checks.iter() {
        data_fields_checks.insert(field.to_string(), serde_json::to_value(check)?);
        log_checks.push(if check.verdict().is_same() {
            LogEntry::success(format!("{field} matches."))
        } else {
            LogEntry::error(format!("{field} does not match."))
        });
    }

    let photo_comparison_status = face_result.is_match();
    log_checks.push(if photo_comparison_status {
        LogEntry::success(PHOTOS_MATCH)
    } else {
        LogEntry::error(PHOTOS_DIFFER)
    });

    Ok(ComparisonReport {
        data_fields_checks,
        document_id_extracted_data: extracted.to_map(),
        document_visual_analysis: visual_analysis,
        data_fields_status: checks.all_same(),
        photo_comparison_result: face_result,
        photo_comparison_status,
        log_checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComparisonVerdict, DocumentType, FieldCheck, LogType};
    use serde_json::Value;

    fn field_check(report: &ComparisonReport, field: &str) -> Option<FieldCheck> {
        report
            .data_fields_checks
            .get(field)
            .cloned()
            .and_then(|v: Value| serde_json::from_value(v).ok())
    }

    fn identical() -> FaceVerifyResult {
        FaceVerifyResult {
            is_identical: true,
            confidence: 0.87,
            photo_1: Some("http://localhost/1.png".into()),
            photo_2: Some("http://localhost/2.png".into()),
            error: None,
        }
    }

    fn checks(verdicts: &[(&str, ComparisonVerdict)]) -> FieldChecks {
        let mut checks = FieldChecks::new();
        for (field, verdict) in verdicts {
            checks.push(*field, FieldCheck::field("a", "b", *verdict));
        }
        checks
    }

    #[test]
    fn test_statuses_and_log_order() {
        let checks = checks(&[
            ("last_name", ComparisonVerdict::Same),
            ("date_of_birth", ComparisonVerdict::ToBeChecked),
        ]);
        let doc = IdDocument::new(DocumentType::Passport);
        let report = aggregate(&checks, identical(), &doc, DocumentVisualAnalysis::default()).unwrap();

        assert!(!report.data_fields_status);
        assert!(report.photo_comparison_status);

        let messages: Vec<(&LogType, &str)> = report
            .log_checks
            .iter()
            .map(|e| (&e.log_type, e.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (&LogType::Success, "last_name matches."),
                (&LogType::Error, "date_of_birth does not match."),
                (&LogType::Success, "The photos match."),
            ]
        );
        let keys: Vec<&String> = report.data_fields_checks.keys().collect();
        assert_eq!(keys, vec!["last_name", "date_of_birth"]);
    }

    #[test]
    fn test_no_faces_fails_photo_status() {
        let doc = IdDocument::new(DocumentType::Passport);
        let report = aggregate(
            &FieldChecks::new(),
            FaceVerifyResult::no_faces(),
            &doc,
            DocumentVisualAnalysis::default(),
        )
        .unwrap();

        assert!(report.data_fields_status);
        assert!(!report.photo_comparison_status);
        assert_eq!(report.photo_comparison_result.confidence, -1.0);
        assert_eq!(report.log_checks.len(), 1);
        assert_eq!(report.log_checks[0].message, "Photos don't match");
    }

    #[test]
    fn test_identical_with_error_is_not_a_match() {
        let doc = IdDocument::new(DocumentType::Passport);
        let face = FaceVerifyResult {
            error: Some("something".into()),
            ..identical()
        };
        let report =
            aggregate(&FieldChecks::new(), face, &doc, DocumentVisualAnalysis::default()).unwrap();
        assert!(!report.photo_comparison_status);
    }

    #[test]
    fn test_report_round_trip() {
        let checks = checks(&[
            ("gender", ComparisonVerdict::Same),
            ("nationality", ComparisonVerdict::Different),
            ("address", ComparisonVerdict::ToBeChecked),
        ]);
        let mut doc = IdDocument::new(DocumentType::DriverLicense);
        doc.gender = Some("F".into());
        let report = aggregate(&checks, identical(), &doc, DocumentVisualAnalysis::default()).unwrap();

        let json = serde_json::to_string(&report).unwrap();
        let back: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
        assert_eq!(
            field_check(&back, "nationality").map(|c| c.verdict()),
            Some(ComparisonVerdict::Different)
        );
    }
}
