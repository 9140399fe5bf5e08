//! Record -> prompt rendering.

use crate::errors::{ChainError, ChainResult};
use crate::labels::LabelSet;
use crate::model::{Prompt, Record};

pub const DEFAULT_TEMPLATE: &str = "\"{text}\"\n\
What is the stance of the previous statement toward {target}?\n\
Respond with only one word: {labels}.";

/// Renders prompts from a fixed template.
///
/// Placeholders: `{text}`, `{target}` and `{labels}`. Rendering is a single
/// pass over the template, so braces inside record text are copied verbatim.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
    label_list: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>, labels: &LabelSet) -> ChainResult<Self> {
        let template = template.into();
        for required in ["{text}", "{target}"] {
            if !template.contains(required) {
                return Err(ChainError::config(format!(
                    "prompt template is missing the {} placeholder",
                    required
                )));
            }
        }
        Ok(Self {
            template,
            label_list: labels.display_list(),
        })
    }

    pub fn build(&self, record: &Record) -> Prompt {
        let mut out = String::with_capacity(self.template.len() + record.text.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let (value, consumed) = if tail.starts_with("{text}") {
                (record.text.as_str(), "{text}".len())
            } else if tail.starts_with("{target}") {
                (record.target.as_str(), "{target}".len())
            } else if tail.starts_with("{labels}") {
                (self.label_list.as_str(), "{labels}".len())
            } else {
                ("{", 1)
            };
            out.push_str(value);
            rest = &tail[consumed..];
        }
        out.push_str(rest);
        Prompt(out)
    }

    pub fn build_all(&self, records: &[Record]) -> Vec<Prompt> {
        records.iter().map(|r| self.build(r)).collect()
    }
}
