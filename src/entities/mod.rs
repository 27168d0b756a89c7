//! Entity definition helpers

pub mod macros;

use uuid::Uuid;

/// Deterministic GUID for seeded rows: the absolute id's decimal digits
/// padded into the first and last groups
/// (`guid_from_id(-3)` is `00000003-0000-0000-0000-000000000003`).
pub fn guid_from_id(id: i64) -> Uuid {
    let id = id.unsigned_abs();
    Uuid::parse_str(&format!(
        "{:08}-0000-0000-0000-{:012}",
        id % 100_000_000,
        id % 1_000_000_000_000
    ))
    .unwrap_or_default()
}
