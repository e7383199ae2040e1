use crate::error::SubjectError;

/// Separator between subject tokens.
pub const TOKEN_SEPARATOR: char = '.';
/// Matches exactly one token.
pub const SINGLE_WILDCARD: &str = "*";
/// Matches one or more trailing tokens; only valid as the last pattern token.
pub const FULL_WILDCARD: &str = ">";
/// Upper bound on tokens in a subject or pattern.
pub const MAX_SUBJECT_TOKENS: usize = 256;

/// Splits a subject into its dot-separated tokens.
pub fn tokens(subject: &str) -> impl Iterator<Item = &str> {
    subject.split(TOKEN_SEPARATOR)
}

/// Validates a subscription pattern.
///
/// Rejects empty patterns, empty tokens, and `>` anywhere but the last token.
pub fn validate_pattern(pattern: &str) -> Result<(), SubjectError> {
    if pattern.is_empty() {
        return Err(SubjectError::Empty);
    }
    let count = check_token_count(pattern)?;
    for (idx, token) in tokens(pattern).enumerate() {
        if token.is_empty() {
            return Err(SubjectError::EmptyToken(idx));
        }
        if token == FULL_WILDCARD && idx + 1 != count {
            return Err(SubjectError::FullWildcardNotLast(idx));
        }
    }
    Ok(())
}

/// Validates a subject that messages are published to.
pub fn validate_subject(subject: &str) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    check_token_count(subject)?;
    for (idx, token) in tokens(subject).enumerate() {
        if token.is_empty() {
            return Err(SubjectError::EmptyToken(idx));
        }
        if token == SINGLE_WILDCARD || token == FULL_WILDCARD {
            return Err(SubjectError::WildcardInLiteral(idx));
        }
    }
    Ok(())
}

fn check_token_count(subject: &str) -> Result<usize, SubjectError> {
    let count = tokens(subject).count();
    if count > MAX_SUBJECT_TOKENS {
        return Err(SubjectError::TooManyTokens {
            count,
            max: MAX_SUBJECT_TOKENS,
        });
    }
    Ok(count)
}

/// Returns true when `subject` contains no wildcard tokens.
pub fn is_literal(subject: &str) -> bool {
    tokens(subject).all(|t| t != SINGLE_WILDCARD && t != FULL_WILDCARD)
}

/// Token-by-token reference match of a literal subject against a pattern.
///
/// Linear in the token count; the trie matcher in `sluice-node` must agree
/// with this for every valid pattern.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = tokens(pattern);
    let mut subject_tokens = tokens(subject);
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some(FULL_WILDCARD), Some(_)) => return pattern_tokens.next().is_none(),
            (Some(SINGLE_WILDCARD), Some(s)) if !s.is_empty() => {}
            (Some(p), Some(s)) if p == s && !s.is_empty() => {}
            _ => return false,
        }
    }
}
