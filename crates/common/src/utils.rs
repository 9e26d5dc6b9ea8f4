//! Small helpers shared across the workspace

use uuid::Uuid;

/// Random UUID string
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Random id under a namespace prefix, e.g. `org:<uuid>` or `action:<uuid>`
pub fn generate_prefixed_uuid(prefix: &str) -> String {
    format!("{}:{}", prefix, Uuid::new_v4())
}

/// Current wall-clock time as seconds since the Unix epoch; voting windows
/// are measured against this clock
pub fn timestamp_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
