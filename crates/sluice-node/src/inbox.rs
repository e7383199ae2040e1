use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random characters appended to the inbox prefix.
pub const INBOX_TOKEN_LEN: usize = 22;

/// Returns a fresh reply subject `<prefix>.<22 base62 chars>`.
pub fn new_inbox(prefix: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INBOX_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}.{token}")
}
