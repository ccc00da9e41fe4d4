//! Location token parser
//!
//! Grammar (subset of EPUB CFI):
//! ```text
//! token     = "epubcfi(" step+ [offset] ")"
//! step      = "/" number [assertion] | "!" [assertion]
//! offset    = ":" number [assertion]
//! assertion = "[" text "]"
//! ```
//!
//! Text assertions after the offset are accepted and dropped: they only help
//! re-anchoring after edits, which a reading position never needs.

use thiserror::Error;

use super::types::{LocationStep, LocationToken, StepKind};

/// Location token parsing errors
#[derive(Debug, Error)]
pub enum LocationParseError {
    #[error("Empty location token")]
    Empty,

    #[error("Location token must start with 'epubcfi('")]
    MissingPrefix,

    #[error("Location token must end with ')'")]
    MissingClosingParen,

    #[error("Location token has no steps")]
    NoSteps,

    #[error("Expected number at position {0}")]
    ExpectedNumber(usize),

    #[error("Unclosed bracket at position {0}")]
    UnclosedBracket(usize),

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<u32, LocationParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }

        self.input[start..self.pos]
            .parse()
            .map_err(|_| LocationParseError::ExpectedNumber(start))
    }

    /// Bracketed assertion content, with `^` escapes resolved
    fn assertion(&mut self) -> Result<Option<String>, LocationParseError> {
        let start = self.pos;
        if !self.skip_if('[') {
            return Ok(None);
        }

        let mut content = String::new();
        while let Some(ch) = self.advance() {
            match ch {
                '^' => match self.advance() {
                    Some(escaped) => content.push(escaped),
                    None => break,
                },
                ']' => return Ok(Some(content)),
                '[' => return Err(LocationParseError::UnexpectedChar('[', self.pos - 1)),
                other => content.push(other),
            }
        }

        Err(LocationParseError::UnclosedBracket(start))
    }

    fn token(&mut self) -> Result<LocationToken, LocationParseError> {
        if !self.input.starts_with("epubcfi(") {
            return Err(LocationParseError::MissingPrefix);
        }
        self.pos = "epubcfi(".len();

        let mut steps = Vec::new();
        loop {
            if self.skip_if('/') {
                let index = self.number()?;
                let id = self.assertion()?;
                steps.push(LocationStep {
                    kind: StepKind::Element(index),
                    id,
                });
            } else if self.skip_if('!') {
                let id = self.assertion()?;
                steps.push(LocationStep {
                    kind: StepKind::Indirection,
                    id,
                });
            } else {
                break;
            }
        }

        if steps.is_empty() {
            return Err(LocationParseError::NoSteps);
        }

        let offset = if self.skip_if(':') {
            let offset = self.number()?;
            self.assertion()?;
            Some(offset)
        } else {
            None
        };

        if !self.skip_if(')') {
            return match self.peek() {
                None => Err(LocationParseError::MissingClosingParen),
                Some(ch) => Err(LocationParseError::UnexpectedChar(ch, self.pos)),
            };
        }

        Ok(LocationToken { steps, offset })
    }
}

/// Parse a location token string
pub fn parse(input: &str) -> Result<LocationToken, LocationParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LocationParseError::Empty);
    }

    let mut parser = Parser::new(input);
    let token = parser.token()?;

    if let Some(ch) = parser.peek() {
        return Err(LocationParseError::UnexpectedChar(ch, parser.pos));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_token() {
        let token = parse("epubcfi(/6/4!/4/2)").unwrap();
        assert_eq!(token.steps.len(), 5);
        assert_eq!(token.steps[0].kind, StepKind::Element(6));
        assert_eq!(token.steps[2].kind, StepKind::Indirection);
        assert_eq!(token.offset, None);
    }

    #[test]
    fn test_parse_offset_and_ids() {
        let token = parse("epubcfi(/6/4[chapter1]!/4/2/1:42)").unwrap();
        assert_eq!(token.steps[1].id.as_deref(), Some("chapter1"));
        assert_eq!(token.offset, Some(42));
        assert_eq!(token.to_string(), "epubcfi(/6/4[chapter1]!/4/2/1:42)");
    }

    #[test]
    fn test_text_assertion_is_dropped() {
        let token = parse("epubcfi(/6/4!/4/2/1:42[hello,world])").unwrap();
        assert_eq!(token.offset, Some(42));
        assert_eq!(token.to_string(), "epubcfi(/6/4!/4/2/1:42)");
    }

    #[test]
    fn test_escaped_bracket() {
        let token = parse("epubcfi(/6/4[test^]value]!/4)").unwrap();
        assert_eq!(token.steps[1].id.as_deref(), Some("test]value"));
        assert_eq!(parse(&token.to_string()).unwrap().steps[1].id, token.steps[1].id);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("  "), Err(LocationParseError::Empty)));
        assert!(matches!(parse("/6/4"), Err(LocationParseError::MissingPrefix)));
        assert!(matches!(
            parse("epubcfi(/6/4"),
            Err(LocationParseError::MissingClosingParen)
        ));
        assert!(matches!(parse("epubcfi()"), Err(LocationParseError::NoSteps)));
        assert!(matches!(
            parse("epubcfi(/x)"),
            Err(LocationParseError::ExpectedNumber(9))
        ));
        assert!(matches!(
            parse("epubcfi(/6[abc)"),
            Err(LocationParseError::UnclosedBracket(_))
        ));
        assert!(matches!(
            parse("epubcfi(/6/4)tail"),
            Err(LocationParseError::UnexpectedChar('t', 13))
        ));
    }
}
