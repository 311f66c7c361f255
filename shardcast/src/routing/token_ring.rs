use crate::routing::Token;

/// A continuous hash ring of `(Token, ElemT)` entries sorted by token.
///
/// Lookups hash a key onto the ring and walk it in the direction of
/// increasing tokens, wrapping around after the largest one.
#[derive(Debug, Clone)]
pub struct TokenRing<ElemT> {
    ring: Vec<(Token, ElemT)>,
}

impl<ElemT> Default for TokenRing<ElemT> {
    fn default() -> Self {
        Self { ring: Vec::new() }
    }
}

impl<ElemT> TokenRing<ElemT> {
    /// Builds a ring out of arbitrarily ordered entries.
    pub fn new(entries: impl IntoIterator<Item = (Token, ElemT)>) -> TokenRing<ElemT> {
        let mut ring: Vec<(Token, ElemT)> = entries.into_iter().collect();
        // Stable, so entries sharing a token keep their insertion order.
        ring.sort_by_key(|(token, _)| *token);
        TokenRing { ring }
    }

    /// Iterates over all members of the ring starting at the lowest token.
    pub fn iter(&self) -> impl Iterator<Item = &(Token, ElemT)> {
        self.ring.iter()
    }

    /// Iterates over the whole ring once, starting at the first member whose
    /// token is not lower than `token`.
    pub fn ring_range_full(&self, token: Token) -> impl Iterator<Item = &(Token, ElemT)> {
        let start = self.ring.partition_point(|(t, _)| *t < token);
        let (before, after) = self.ring.split_at(start);
        after.iter().chain(before.iter())
    }

    /// Like [TokenRing::ring_range_full], yielding only the elements.
    pub fn ring_range(&self, token: Token) -> impl Iterator<Item = &ElemT> {
        self.ring_range_full(token).map(|(_, elem)| elem)
    }

    /// Returns the owner of `token`: the first member at or after it.
    pub fn get_elem_for_token(&self, token: Token) -> Option<&ElemT> {
        self.ring_range(token).next()
    }

    /// Number of entries on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if the ring has no entries.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
