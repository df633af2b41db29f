//! field path syntax
//!
//! A field path addresses nodes inside a document tree.
//!
//! - segments are separated by `/`, or by `.` when the path contains no `/` (outside brackets)
//! - `[...]` starts a bracketed segment
//!   - `["a.b"]` or `['a.b']`: a quoted literal map key
//!   - `[2]`: a list index
//!   - `[name=foo]`: every list element whose `name` field is `foo`
//! - `""` and `"/"` address the root of the tree
//!
//! | **path**                             | **segments**                          |
//! |--------------------------------------|---------------------------------------|
//! | `spec/template/spec/containers/name` | 5 fields                              |
//! | `metadata.labels.app`                | 3 fields                              |
//! | `data["app.properties"]`             | `data`, `app.properties`              |
//! | `spec.containers[0].image`           | `spec`, `containers`, `0`, `image`    |
//! | `spec/containers[name=web]/image`    | `spec`, `containers`, `name=web`, ... |
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// map key
    Field(String),
    /// explicit list index
    Index(usize),
    /// list elements whose `key` field equals `value`
    Match { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    source: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let separator = if has_unbracketed_slash(path) { '/' } else { '.' };

        let mut segments = vec![];
        let mut start = 0;
        let mut bracket_start = None;

        for (i, c) in path.char_indices() {
            match (c, bracket_start) {
                ('[', Some(_)) => return Err(PathError::NestedBrackets(path.to_string())),
                ('[', None) => {
                    push_field(&mut segments, &path[start..i]);
                    bracket_start = Some(i + 1);
                }
                (']', Some(open)) => {
                    segments.push(bracket_segment(path, &path[open..i])?);
                    bracket_start = None;
                    start = i + 1;
                }
                (']', None) => return Err(PathError::Unbalanced(path.to_string())),
                (c, None) if c == separator => {
                    push_field(&mut segments, &path[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }

        if bracket_start.is_some() {
            return Err(PathError::Unbalanced(path.to_string()));
        }
        push_field(&mut segments, &path[start..]);

        Ok(Self {
            source: path.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Addresses the whole tree
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the first segment when it is a map key
    pub fn first_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Field(field)) => Some(field),
            _ => None,
        }
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn has_unbracketed_slash(path: &str) -> bool {
    let mut depth = 0usize;
    for c in path.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn push_field(segments: &mut Vec<Segment>, field: &str) {
    if !field.is_empty() {
        segments.push(Segment::Field(field.to_string()));
    }
}

fn bracket_segment(path: &str, content: &str) -> Result<Segment, PathError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(PathError::EmptyBracket(path.to_string()));
    }

    if let Some(literal) = unquote(content) {
        return Ok(Segment::Field(literal.to_string()));
    }

    if let Ok(index) = content.parse::<usize>() {
        return Ok(Segment::Index(index));
    }

    if let Some((key, value)) = content.split_once('=') {
        let value = value.trim();
        return Ok(Segment::Match {
            key: key.trim().to_string(),
            value: unquote(value).unwrap_or(value).to_string(),
        });
    }

    Ok(Segment::Field(content.to_string()))
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        s.strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    })
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PathError {
    #[error("nested brackets are not allowed: {0}")]
    NestedBrackets(String),
    #[error("unbalanced brackets in field path: {0}")]
    Unbalanced(String),
    #[error("empty brackets in field path: {0}")]
    EmptyBracket(String),
}
