//! Graph description tokenizer.
//!
//! Grammar: elements separated by `!`, each element a factory name followed
//! by `property=value` pairs. Values may be double-quoted to include
//! whitespace or `!`.
//!
//! ```text
//! fakesrc num-buffers=5 sizetype=fixed sizemax=42 ! identity ! appsink name=sink
//! ```

use super::codes;
use crate::error::{ErrorDomain, NativeError};

/// One element of a parsed description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    pub factory: String,
    pub properties: Vec<(String, String)>,
}

impl ElementSpec {
    /// Value of `key`, last assignment wins
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn syntax_error(message: impl Into<String>) -> NativeError {
    NativeError::new(ErrorDomain::Parse, codes::PARSE_SYNTAX, message)
}

/// Split a description into `!`-separated chunks of whitespace-separated words.
fn tokenize(description: &str) -> Result<Vec<Vec<String>>, NativeError> {
    let mut chunks = vec![Vec::new()];
    let mut word = String::new();
    let mut in_word = false;
    let mut in_quotes = false;

    for c in description.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_word = true;
            }
            c if in_quotes => word.push(c),
            '!' => {
                if in_word {
                    if let Some(chunk) = chunks.last_mut() {
                        chunk.push(std::mem::take(&mut word));
                    }
                    in_word = false;
                }
                chunks.push(Vec::new());
            }
            c if c.is_whitespace() => {
                if in_word {
                    if let Some(chunk) = chunks.last_mut() {
                        chunk.push(std::mem::take(&mut word));
                    }
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if in_quotes {
        return Err(syntax_error("syntax error: unterminated quote"));
    }
    if in_word {
        if let Some(chunk) = chunks.last_mut() {
            chunk.push(word);
        }
    }
    Ok(chunks)
}

/// Parse a description into its elements, in link order.
pub fn parse_description(description: &str) -> Result<Vec<ElementSpec>, NativeError> {
    let chunks = tokenize(description)?;

    if chunks.iter().all(|chunk| chunk.is_empty()) {
        return Err(NativeError::new(
            ErrorDomain::Parse,
            codes::PARSE_EMPTY,
            "empty pipeline not allowed",
        ));
    }

    let mut elements = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let mut words = chunk.into_iter();
        let Some(factory) = words.next() else {
            return Err(syntax_error("syntax error: empty element in link"));
        };
        if factory.contains('=') {
            return Err(syntax_error(format!(
                "syntax error: expected element name, found \"{}\"",
                factory
            )));
        }

        let mut properties = Vec::new();
        for word in words {
            match word.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    properties.push((key.to_string(), value.to_string()));
                }
                _ => {
                    return Err(syntax_error(format!(
                        "syntax error: unexpected \"{}\" in element \"{}\"",
                        word, factory
                    )));
                }
            }
        }

        elements.push(ElementSpec {
            factory,
            properties,
        });
    }

    Ok(elements)
}
