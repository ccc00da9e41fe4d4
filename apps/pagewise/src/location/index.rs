//! Generated location table for reflowable documents

use super::types::LocationToken;

/// Ordered table of addressable locations produced by a layout pass.
///
/// Positions are 1-based. The table is only valid for the style it was
/// generated under; any font or theme change invalidates it.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    tokens: Vec<LocationToken>,
}

impl LocationIndex {
    pub fn new(mut tokens: Vec<LocationToken>) -> Self {
        tokens.sort();
        tokens.dedup();
        Self { tokens }
    }

    /// Number of positions in the table
    pub fn total(&self) -> u32 {
        u32::try_from(self.tokens.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token starting the given 1-based position
    pub fn token_at(&self, position: u32) -> Option<&LocationToken> {
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        self.tokens.get(index)
    }

    /// Position containing `token`: the last entry not after it.
    ///
    /// Tokens before the first entry map to position 1; `None` only for an
    /// empty table.
    pub fn locate(&self, token: &LocationToken) -> Option<u32> {
        if self.tokens.is_empty() {
            return None;
        }

        let after = self.tokens.partition_point(|entry| entry <= token);
        Some(u32::try_from(after.max(1)).unwrap_or(u32::MAX))
    }

    pub fn first(&self) -> Option<&LocationToken> {
        self.tokens.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationToken> {
        self.tokens.iter()
    }
}
