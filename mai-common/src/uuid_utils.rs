//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new UUIDv4 in its hyphenated string form
///
/// Used for identifiers that travel through JSON records (`docId`, entity ids).
pub fn generate_id() -> String {
    generate().to_string()
}
