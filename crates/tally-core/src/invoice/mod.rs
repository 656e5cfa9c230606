//! Invoice field mapping: prompt rendering and response parsing.

mod parser;
mod prompt;

pub use parser::ResponseParser;
pub use prompt::{PromptBuilder, PROMPT_VERSION};
