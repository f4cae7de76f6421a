//! The caller-facing error returned when a match fails without being
//! recovered by a registered handler.

use super::expected::{Expectation, ExpectedSet};

/// An unrecovered match failure.
///
/// `label` is `None` for the FAIL-with-empty-backtrack-stack case and
/// `Some` for an unhandled `THROW`. `start`/`end` both hold the furthest
/// failure position reached during the match; there is no meaningful
/// "matched span" to report for a failure, so the two are equal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.render_without_source())]
pub struct ParsingError {
    pub message: Option<String>,
    pub label: Option<Box<str>>,
    pub start: usize,
    pub end: usize,
    expected: Vec<Expectation>,
}

impl ParsingError {
    pub(crate) fn new(
        label: Option<Box<str>>,
        message: Option<String>,
        position: usize,
        expected: &ExpectedSet,
    ) -> Self {
        Self {
            message,
            label,
            start: position,
            end: position,
            expected: expected.entries().to_vec(),
        }
    }

    /// "Expected X,Y,Z but got '?'" / "Unexpected ..." formatting, given
    /// the original input the match ran against (so the offending byte can
    /// be shown).
    pub fn render(&self, source: &[u8]) -> String {
        let got = source
            .get(self.start)
            .map(|&b| format!("{:?}", b as char))
            .unwrap_or_else(|| "<end of input>".to_string());
        self.render_with_got(&got)
    }

    fn render_without_source(&self) -> String {
        self.render_with_got("?")
    }

    fn render_with_got(&self, got: &str) -> String {
        let mut out = String::new();
        if let Some(label) = &self.label {
            out.push_str(label);
            if let Some(message) = &self.message {
                out.push_str(": ");
                out.push_str(message);
                return out;
            }
            out.push_str(": ");
        }
        if self.expected.is_empty() {
            out.push_str(&format!("Unexpected {got} at position {}", self.start));
        } else {
            out.push_str("Expected ");
            out.push_str(&self.expected_list());
            out.push_str(&format!(" but got {got} at position {}", self.start));
        }
        out
    }

    fn expected_list(&self) -> String {
        self.expected
            .iter()
            .map(|e| match e {
                Expectation::Single(c) => format!("{c:?}"),
                Expectation::Range(a, b) => format!("{a:?}..{b:?}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
