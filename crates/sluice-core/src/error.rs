use thiserror::Error;

/// Errors raised when a subject or subscription pattern is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    /// Subject or pattern has no characters at all.
    #[error("invalid subject: empty")]
    Empty,
    /// A token between two separators (or at either end) is empty.
    #[error("invalid subject: empty token at position {0}")]
    EmptyToken(usize),
    /// `>` appears before the final token of a pattern.
    #[error("invalid subject: '>' must be the last token (found at position {0})")]
    FullWildcardNotLast(usize),
    /// Wildcards are not allowed in a published subject.
    #[error("invalid subject: wildcard in literal subject at position {0}")]
    WildcardInLiteral(usize),
    /// More tokens than the matcher accepts.
    #[error("invalid subject: {count} tokens exceeds the limit of {max}")]
    TooManyTokens { count: usize, max: usize },
}
