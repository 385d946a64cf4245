//! Boundary validation of analysis service answers
//!
//! Turns the message content returned by the service into a strictly typed
//! [`TierResponse`] or a [`MalformedResponse`]. Nothing downstream ever sees
//! unvalidated service output.

use crate::error::MalformedResponse;
use crate::models::{Decision, ProposalDraft, TierResponse, VocabularyType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parse and validate the content of one service answer.
///
/// Expected shape: `{"proposals": [{type, candidate, decision,
/// target_or_key, reason, citation, confidence}, ...]}`. An empty proposal
/// list is valid. Proposals of unknown vocabulary types and IGNORE proposals
/// without a candidate are dropped. When the service returns several
/// proposals for one type, the most confident one is kept.
pub fn parse_tier_response(content: &str) -> Result<TierResponse, MalformedResponse> {
    let body = strip_code_fence(content.trim());
    if body.is_empty() {
        return Err(MalformedResponse::Empty);
    }

    let root: Value =
        serde_json::from_str(body).map_err(|e| MalformedResponse::InvalidJson(e.to_string()))?;

    let object = root
        .as_object()
        .ok_or_else(|| MalformedResponse::InvalidJson("top level is not an object".to_string()))?;

    let items = match object.get("proposals") {
        None | Some(Value::Null) => return Err(MalformedResponse::MissingField("proposals")),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(MalformedResponse::InvalidJson(
                "`proposals` is not an array".to_string(),
            ))
        }
    };

    let mut by_type: BTreeMap<VocabularyType, ProposalDraft> = BTreeMap::new();

    for (index, item) in items.iter().enumerate() {
        let fields = item.as_object().ok_or_else(|| MalformedResponse::InvalidValue {
            index,
            field: "proposal",
            value: item.to_string(),
        })?;

        let Some(draft) = parse_proposal(index, fields)? else {
            continue;
        };

        match by_type.get(&draft.vocabulary_type) {
            Some(existing) if existing.confidence >= draft.confidence => {
                tracing::debug!(
                    vocabulary_type = %draft.vocabulary_type,
                    dropped = %draft.candidate,
                    "Duplicate proposal for type, keeping the more confident one"
                );
            }
            _ => {
                by_type.insert(draft.vocabulary_type, draft);
            }
        }
    }

    Ok(TierResponse {
        proposals: by_type.into_values().collect(),
    })
}

/// Validate one proposal object; `Ok(None)` means "drop silently"
fn parse_proposal(
    index: usize,
    fields: &Map<String, Value>,
) -> Result<Option<ProposalDraft>, MalformedResponse> {
    let type_raw = required_str(index, fields, "type")?;
    let Some(vocabulary_type) = VocabularyType::parse(type_raw) else {
        tracing::warn!(index, vocabulary_type = type_raw, "Dropping proposal of unknown type");
        return Ok(None);
    };

    let decision_raw = required_str(index, fields, "decision")?;
    let decision = Decision::parse(decision_raw).ok_or_else(|| MalformedResponse::InvalidValue {
        index,
        field: "decision",
        value: decision_raw.to_string(),
    })?;

    let candidate = optional_str(index, fields, "candidate")?.trim().to_string();
    if candidate.is_empty() {
        if decision == Decision::Ignore {
            return Ok(None);
        }
        return Err(MalformedResponse::InvalidValue {
            index,
            field: "candidate",
            value: String::new(),
        });
    }

    let target = optional_str(index, fields, "target_or_key")?.trim();
    let mapping_target = match decision {
        Decision::MapToExisting if target.is_empty() => {
            return Err(MalformedResponse::InvalidValue {
                index,
                field: "target_or_key",
                value: String::new(),
            })
        }
        Decision::MapToExisting => Some(target.to_string()),
        _ => None,
    };

    let confidence = parse_confidence(index, fields.get("confidence"))?;

    Ok(Some(ProposalDraft {
        vocabulary_type,
        candidate,
        decision,
        mapping_target,
        justification: optional_str(index, fields, "reason")?.trim().to_string(),
        quote: optional_str(index, fields, "citation")?.trim().to_string(),
        confidence,
    }))
}

fn required_str<'a>(
    index: usize,
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, MalformedResponse> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(MalformedResponse::MissingField(field)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(MalformedResponse::InvalidValue {
            index,
            field,
            value: other.to_string(),
        }),
    }
}

fn optional_str<'a>(
    index: usize,
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, MalformedResponse> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(MalformedResponse::InvalidValue {
            index,
            field,
            value: other.to_string(),
        }),
    }
}

/// Number or numeric string, finite, within [0, 1]
fn parse_confidence(index: usize, value: Option<&Value>) -> Result<f64, MalformedResponse> {
    let invalid = |v: &Value| MalformedResponse::InvalidValue {
        index,
        field: "confidence",
        value: v.to_string(),
    };

    let parsed = match value {
        None | Some(Value::Null) => return Err(MalformedResponse::MissingField("confidence")),
        Some(v @ Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(v))?,
        Some(v @ Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(v))?,
        Some(v) => return Err(invalid(v)),
    };

    if parsed.is_finite() && (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(MalformedResponse::InvalidValue {
            index,
            field: "confidence",
            value: parsed.to_string(),
        })
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```)
fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_response() {
        let content = r#"{"proposals": [
            {"type": "aktivitaet", "candidate": "Drohnenflug", "decision": "ADD_NEW",
             "target_or_key": "", "reason": "nicht im Katalog", "citation": "Drohnen zu fliegen", "confidence": 0.9},
            {"type": "ort", "candidate": "Ufer", "decision": "MAP_TO_EXISTING",
             "target_or_key": "Uferbereich", "reason": "Synonym", "citation": "am Ufer", "confidence": "0.8"}
        ]}"#;

        let response = parse_tier_response(content).unwrap();
        assert_eq!(response.proposals.len(), 2);

        let activity = &response.proposals[0];
        assert_eq!(activity.vocabulary_type, VocabularyType::Activity);
        assert_eq!(activity.decision, Decision::AddNew);
        assert_eq!(activity.mapping_target, None);
        assert_eq!(activity.quote, "Drohnen zu fliegen");

        let location = &response.proposals[1];
        assert_eq!(location.mapping_target.as_deref(), Some("Uferbereich"));
        assert_eq!(location.confidence, 0.8);
    }

    #[test]
    fn test_empty_list_is_valid() {
        let response = parse_tier_response(r#"{"proposals": []}"#).unwrap();
        assert!(response.proposals.is_empty());
    }

    #[test]
    fn test_code_fence_stripped() {
        let response = parse_tier_response("```json\n{\"proposals\": []}\n```").unwrap();
        assert!(response.proposals.is_empty());
    }

    #[test]
    fn test_structural_failures() {
        assert_eq!(parse_tier_response("  "), Err(MalformedResponse::Empty));
        assert!(matches!(
            parse_tier_response("Sorry, I cannot"),
            Err(MalformedResponse::InvalidJson(_))
        ));
        assert_eq!(
            parse_tier_response(r#"{"result": []}"#),
            Err(MalformedResponse::MissingField("proposals"))
        );
    }

    #[test]
    fn test_confidence_out_of_range() {
        let content = r#"{"proposals": [{"type": "zone", "candidate": "Ruhezone",
            "decision": "ADD_NEW", "confidence": 1.5}]}"#;
        assert!(matches!(
            parse_tier_response(content),
            Err(MalformedResponse::InvalidValue { field: "confidence", .. })
        ));
    }

    #[test]
    fn test_invalid_decision() {
        let content = r#"{"proposals": [{"type": "zone", "candidate": "Ruhezone",
            "decision": "MAYBE", "confidence": 0.5}]}"#;
        assert!(matches!(
            parse_tier_response(content),
            Err(MalformedResponse::InvalidValue { field: "decision", .. })
        ));
    }

    #[test]
    fn test_map_requires_target() {
        let content = r#"{"proposals": [{"type": "zone", "candidate": "Kern",
            "decision": "MAP_TO_EXISTING", "target_or_key": " ", "confidence": 0.5}]}"#;
        assert!(matches!(
            parse_tier_response(content),
            Err(MalformedResponse::InvalidValue { field: "target_or_key", .. })
        ));
    }

    #[test]
    fn test_unknown_type_and_empty_ignore_dropped() {
        let content = r#"{"proposals": [
            {"type": "species", "candidate": "Biber", "decision": "ADD_NEW", "confidence": 0.9},
            {"type": "zone", "candidate": "", "decision": "IGNORE", "confidence": 0.2}
        ]}"#;
        let response = parse_tier_response(content).unwrap();
        assert!(response.proposals.is_empty());
    }

    #[test]
    fn test_duplicate_type_keeps_most_confident() {
        let content = r#"{"proposals": [
            {"type": "activity", "candidate": "Baden", "decision": "ADD_NEW", "confidence": 0.4},
            {"type": "activity", "candidate": "Schwimmen", "decision": "ADD_NEW", "confidence": 0.7}
        ]}"#;
        let response = parse_tier_response(content).unwrap();
        assert_eq!(response.proposals.len(), 1);
        assert_eq!(response.proposals[0].candidate, "Schwimmen");
    }
}
