//! Location token types
//!
//! Reflowable positions are EPUB Canonical Fragment Identifiers.
//! Format: epubcfi(/6/4[chap01ref]!/4/2/1:268)
//!
//! Only the parts a reading position needs are kept: element steps with
//! optional ID assertions, indirections and a trailing character offset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, ordered marker of a position inside a reflowable document
///
/// Tokens compare structurally (step by step, then by character offset).
/// They are never used for arithmetic.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationToken {
    /// Path steps from the package document downwards
    pub steps: Vec<LocationStep>,
    /// Character offset inside the final text node
    pub offset: Option<u32>,
}

/// A single step in a token path
#[derive(Debug, Clone, Eq)]
pub struct LocationStep {
    pub kind: StepKind,
    /// Optional `[id]` assertion, ignored for ordering
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Element step with index (e.g. /4 = second child element)
    Element(u32),
    /// Indirection step (!) into a referenced content document
    Indirection,
}

impl LocationToken {
    /// Token pointing into the spine item at `spine_index`.
    ///
    /// `inner` are the element steps inside the content document and `offset`
    /// the character offset in the last text node.
    pub fn in_spine(spine_index: u32, inner: &[u32], offset: Option<u32>) -> Self {
        let mut steps = vec![
            LocationStep::element(6),
            LocationStep::element((spine_index + 1) * 2),
            LocationStep::indirection(),
        ];
        steps.extend(inner.iter().map(|index| LocationStep::element(*index)));
        Self { steps, offset }
    }

    /// Spine index referenced by the `/6/N` prefix, if any
    pub fn spine_index(&self) -> Option<u32> {
        match self.steps.as_slice() {
            [first, second, ..] => match (first.kind, second.kind) {
                // CFI uses even numbering for elements: /2, /4, /6 ...
                (StepKind::Element(6), StepKind::Element(n)) => Some((n / 2).saturating_sub(1)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl LocationStep {
    pub fn element(index: u32) -> Self {
        Self {
            kind: StepKind::Element(index),
            id: None,
        }
    }

    pub fn element_with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Element(index),
            id: Some(id.into()),
        }
    }

    pub fn indirection() -> Self {
        Self {
            kind: StepKind::Indirection,
            id: None,
        }
    }
}

impl fmt::Display for LocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi(")?;
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(offset) = self.offset {
            write!(f, ":{}", offset)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for LocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StepKind::Element(n) => write!(f, "/{}", n)?,
            StepKind::Indirection => write!(f, "!")?,
        }
        if let Some(ref id) = self.id {
            // ']' and '^' must be escaped inside assertions
            let escaped = id.replace('^', "^^").replace(']', "^]").replace('[', "^[");
            write!(f, "[{}]", escaped)?;
        }
        Ok(())
    }
}

impl From<LocationToken> for String {
    fn from(token: LocationToken) -> Self {
        token.to_string()
    }
}

impl TryFrom<String> for LocationToken {
    type Error = super::parser::LocationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        super::parser::parse(&value)
    }
}
