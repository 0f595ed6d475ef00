//! SQL schema for the response cache.

/// Returns the full SQL schema as a single batch string.
///
/// - `responses` - one cached response body per request fingerprint, with
///   the time it was stored (unix seconds, UTC)
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS responses (
        request_key TEXT PRIMARY KEY,
        body TEXT NOT NULL,
        stored_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_responses_stored_at ON responses(stored_at);
    "#
}
