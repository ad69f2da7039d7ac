pub mod api_types;
pub mod auth;
pub mod config_doc;
pub mod cors;
pub mod store;

/// Current wall-clock time as an RFC 3339 UTC timestamp.
pub fn current_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
