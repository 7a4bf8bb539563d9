//! The witness access predicate.
//!
//! A memory is visible to an entity iff the entity appears in the memory's
//! witness set (compared on normalised IDs) or the memory is public. There is
//! no administrative override: an ops actor who needs to inspect a record
//! must read the row out of band.

use crate::memory::types::{normalize_entity_id, MemoryRecord, PrivacyLevel};

/// Decide whether `requesting_entity` may see `record`.
pub fn allow(record: &MemoryRecord, requesting_entity: &str) -> bool {
    if record.privacy_level == PrivacyLevel::Public {
        return true;
    }
    let requester = normalize_entity_id(requesting_entity);
    record
        .witnessed_by
        .iter()
        .any(|w| normalize_entity_id(w) == requester)
}
