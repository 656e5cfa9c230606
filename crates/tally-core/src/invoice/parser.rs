//! Strict parsing of model completions into invoice records.

use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;
use crate::models::record::InvoiceRecord;

/// Number of characters of an offending completion kept in error messages.
const EXCERPT_CHARS: usize = 80;

/// Parses completion text into an [`InvoiceRecord`].
///
/// No repair is attempted: prose around the JSON, markdown fences, truncated
/// objects, non-object values, unknown keys, `null`s and non-string scalars
/// all fail. Keys the model left out take their empty default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a completion.
    pub fn parse(&self, raw: &str) -> Result<InvoiceRecord, ParseError> {
        let value: Value = serde_json::from_str(raw).map_err(|source| ParseError::NotJson {
            source,
            excerpt: excerpt(raw),
        })?;

        if !value.is_object() {
            return Err(ParseError::NotObject {
                found: json_type_name(&value),
            });
        }

        let record: InvoiceRecord = serde_json::from_value(value).map_err(ParseError::Schema)?;
        debug!(
            "Parsed invoice record with {} units",
            record.units.len()
        );
        Ok(record)
    }
}

fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::UnitEntry;
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> Result<InvoiceRecord, ParseError> {
        ResponseParser::new().parse(raw)
    }

    #[test]
    fn test_full_record() {
        let raw = r#"{
            "invoiceId": "123",
            "dateOfIssue": "2024-01-01",
            "billingTo": "ACME Corp, 1 Main St",
            "billingFrom": "Widgets Ltd",
            "units": [
                {"unitName": "Widget", "unitPrice": "45.00", "unitQuantity": "2"}
            ],
            "totalQuantity": "",
            "totalGrossValue": "90.00",
            "totalDiscount": "",
            "totalNetValue": "90.00",
            "totalVatAmount": "10.00",
            "totalAmount": "100.00",
            "totalShippingCharge": ""
        }"#;

        let record = parse(raw).unwrap();
        assert_eq!(record.invoice_id, "123");
        assert_eq!(record.total_amount, "100.00");
        assert_eq!(
            record.units,
            vec![UnitEntry {
                unit_name: "Widget".to_string(),
                unit_price: "45.00".to_string(),
                unit_quantity: "2".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_keys_become_empty_strings() {
        let record = parse(r#"{"invoiceId": "123", "totalAmount": "100.00"}"#).unwrap();
        assert_eq!(record.total_discount, "");
        assert!(record.units.is_empty());

        let value = serde_json::to_value(&record).unwrap();
        for key in InvoiceRecord::field_names() {
            assert!(value.get(key).is_some(), "missing {key}");
            assert!(!value[key].is_null(), "null {key}");
        }
    }

    #[test]
    fn test_empty_object_is_empty_record() {
        let record = parse("{}").unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_prose_fails() {
        let err = parse("Sorry, I cannot process this.").unwrap_err();
        match err {
            ParseError::NotJson { excerpt, .. } => {
                assert_eq!(excerpt, "Sorry, I cannot process this.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_prose_wrapped_json_fails() {
        assert!(matches!(
            parse(r#"Here is the JSON: {"invoiceId": "1"}"#),
            Err(ParseError::NotJson { .. })
        ));
        assert!(matches!(
            parse("{\"invoiceId\": \"1\"}\nLet me know if you need anything else."),
            Err(ParseError::NotJson { .. })
        ));
        assert!(matches!(
            parse("```json\n{\"invoiceId\": \"1\"}\n```"),
            Err(ParseError::NotJson { .. })
        ));
    }

    #[test]
    fn test_truncated_json_fails() {
        assert!(matches!(
            parse(r#"{"invoiceId": "123", "units": [{"unitName": "Wid"#),
            Err(ParseError::NotJson { .. })
        ));
    }

    #[test]
    fn test_non_object_fails() {
        assert!(matches!(
            parse(r#"["invoiceId", "123"]"#),
            Err(ParseError::NotObject { found: "array" })
        ));
        assert!(matches!(
            parse(r#""just a string""#),
            Err(ParseError::NotObject { found: "string" })
        ));
    }

    #[test]
    fn test_schema_mismatch_fails() {
        // Unknown key.
        assert!(matches!(
            parse(r#"{"invoiceNumber": "123"}"#),
            Err(ParseError::Schema(_))
        ));
        // Number instead of string.
        assert!(matches!(
            parse(r#"{"totalAmount": 100.0}"#),
            Err(ParseError::Schema(_))
        ));
        // Null instead of string.
        assert!(matches!(
            parse(r#"{"totalDiscount": null}"#),
            Err(ParseError::Schema(_))
        ));
        // Units as a string, the way older templates showed it.
        assert!(matches!(
            parse(r#"{"units": ""}"#),
            Err(ParseError::Schema(_))
        ));
    }

    #[test]
    fn test_surrounding_whitespace_is_fine() {
        let record = parse("\n  {\"invoiceId\": \"7\"}  \n").unwrap();
        assert_eq!(record.invoice_id, "7");
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "x".repeat(500);
        let excerpt = excerpt(&long);
        assert_eq!(excerpt.len(), EXCERPT_CHARS + 3);
        assert!(excerpt.ends_with("..."));
    }
}
