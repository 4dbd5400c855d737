use ulid::Ulid;

/// Numeric user id issued by the identity service.
pub type UserId = i64;

/// Numeric project id owned by the project service.
pub type ProjectId = i64;

/// Numeric id of any live entity (story, task, worklog, ...).
pub type EntityId = i64;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = live_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Parse a project id as carried on the connection request.
///
/// Only strictly positive integers are accepted; surrounding whitespace is
/// not trimmed.
pub fn parse_project_id(raw: &str) -> Option<ProjectId> {
    raw.parse::<ProjectId>().ok().filter(|id| *id > 0)
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
}
