//! Extraction prompt rendering.

use crate::models::record::{InvoiceRecord, FIELD_GUIDE};
use crate::ocr::OcrText;

/// Version of the instruction template. Bump whenever the wording or the
/// record schema changes.
pub const PROMPT_VERSION: &str = "v1";

const PREAMBLE: &str = "Extract the following details from the provided OCR text:";
const OCR_HEADING: &str = "### Table OCR Text:";
const FORMAT_HEADING: &str = "Provide the extracted values in the following JSON format:";
const OUTPUT_RULE: &str =
    "Output should be in JSON object format without extra characters or explanations.";

/// Renders the fixed extraction instruction around OCR text.
///
/// The field list comes from [`FIELD_GUIDE`] and the JSON skeleton is the
/// serialized [`InvoiceRecord::schema_skeleton`], so the prompt always
/// describes the exact shape the response parser accepts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    head: String,
    tail: String,
}

impl PromptBuilder {
    /// Create a builder with the current template.
    pub fn new() -> Self {
        let mut head = String::new();
        head.push_str(PREAMBLE);
        head.push_str("\n\n");
        for guide in FIELD_GUIDE {
            head.push_str(&format!("{}: {}\n", guide.key, guide.description));
        }
        head.push_str("\nProvide the extracted values as structured JSON object.\n\n");
        head.push_str(OCR_HEADING);
        head.push('\n');

        let skeleton = serde_json::to_string_pretty(&InvoiceRecord::schema_skeleton())
            .expect("invoice record skeleton serializes");

        let mut tail = String::new();
        tail.push_str("\n\n");
        tail.push_str(FORMAT_HEADING);
        tail.push('\n');
        tail.push_str(&skeleton);
        tail.push_str("\n\n");
        tail.push_str(OUTPUT_RULE);
        tail.push('\n');

        Self { head, tail }
    }

    /// Template version.
    pub fn version(&self) -> &'static str {
        PROMPT_VERSION
    }

    /// Render the prompt for recognized text.
    pub fn build(&self, text: &OcrText) -> String {
        self.build_from_str(&text.as_text())
    }

    /// Render the prompt for raw OCR text.
    pub fn build_from_str(&self, text: &str) -> String {
        let mut prompt = String::with_capacity(self.head.len() + text.len() + self.tail.len());
        prompt.push_str(&self.head);
        prompt.push_str(text);
        prompt.push_str(&self.tail);
        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
