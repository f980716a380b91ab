//! RFC 6901 JSON Pointers.
//!
//! Patch operations address locations with pointers, and query matches report
//! their location as one, so a query result can be fed straight into a patch.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A parsed JSON Pointer: a sequence of unescaped reference tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PointerError {
    pub reason: String,
}

impl PointerError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl JsonPointer {
    /// The empty pointer, addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(pointer: &str) -> Result<Self, PointerError> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(PointerError::new("pointer must be empty or start with '/'"));
        };
        let tokens = rest
            .split('/')
            .map(unescape)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push(token);
        next
    }

    /// Parent pointer and the last token, or `None` for the root.
    pub fn split_last(&self) -> Option<(JsonPointer, &str)> {
        let (last, parent) = self.tokens.split_last()?;
        Some((
            JsonPointer {
                tokens: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    /// Whether `self` is `other` or lies underneath it.
    pub fn starts_with(&self, other: &JsonPointer) -> bool {
        self.tokens.starts_with(&other.tokens)
    }

    /// Resolve against a document. `Ok(None)` means the location does not
    /// exist; `Err` means a token can never be a valid index for the array
    /// it meets.
    pub fn get<'a>(&self, document: &'a Value) -> Result<Option<&'a Value>, PointerError> {
        let mut current = document;
        for token in &self.tokens {
            current = match current {
                Value::Object(map) => match map.get(token) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                Value::Array(items) => {
                    if token == "-" {
                        return Ok(None);
                    }
                    match items.get(parse_array_index(token)?) {
                        Some(value) => value,
                        None => return Ok(None),
                    }
                }
                _ => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    pub fn get_mut<'a>(
        &self,
        document: &'a mut Value,
    ) -> Result<Option<&'a mut Value>, PointerError> {
        let mut current = document;
        for token in &self.tokens {
            current = match current {
                Value::Object(map) => match map.get_mut(token) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                Value::Array(items) => {
                    if token == "-" {
                        return Ok(None);
                    }
                    match items.get_mut(parse_array_index(token)?) {
                        Some(value) => value,
                        None => return Ok(None),
                    }
                }
                _ => return Ok(None),
            };
        }
        Ok(Some(current))
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// Parse an array index token: `0` or a digit string without leading zeros.
pub fn parse_array_index(token: &str) -> Result<usize, PointerError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PointerError::new(format!(
            "'{token}' is not a valid array index"
        )));
    }
    if token.len() > 1 && token.starts_with('0') {
        return Err(PointerError::new(format!(
            "array index '{token}' has a leading zero"
        )));
    }
    token
        .parse()
        .map_err(|_| PointerError::new(format!("array index '{token}' is out of range")))
}

fn unescape(raw: &str) -> Result<String, PointerError> {
    if !raw.contains('~') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(PointerError::new(format!(
                    "bad escape in '{raw}': '~' must be followed by '0' or '1'"
                )));
            }
        }
    }
    Ok(out)
}
