//! Location token ordering
//!
//! Tokens order by reading position. ID assertions never take part in the
//! comparison, so equality follows the same rule.

use std::cmp::Ordering;

use super::types::{LocationStep, LocationToken, StepKind};

impl Ord for LocationToken {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.steps.iter().zip(other.steps.iter()) {
            let step = a.cmp(b);
            if step != Ordering::Equal {
                return step;
            }
        }

        // A shorter path is the ancestor of a longer one and comes first
        self.steps
            .len()
            .cmp(&other.steps.len())
            .then_with(|| match (self.offset, other.offset) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
    }
}

impl PartialOrd for LocationToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LocationToken {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for LocationStep {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.kind, other.kind) {
            (StepKind::Indirection, StepKind::Indirection) => Ordering::Equal,
            (StepKind::Element(a), StepKind::Element(b)) => a.cmp(&b),
            (StepKind::Indirection, StepKind::Element(_)) => Ordering::Less,
            (StepKind::Element(_), StepKind::Indirection) => Ordering::Greater,
        }
    }
}

impl PartialOrd for LocationStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LocationStep {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
