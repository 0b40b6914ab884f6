//! Section serializer: one structural writer per section at a time.

use std::time::Instant;

use tracing::{debug, warn};

use menu_shared::SectionId;

use crate::error::DomainError;
use crate::repositories::MenuTransaction;

/// Lock keys in the order they must be taken: ascending, de-duplicated.
pub fn lock_order(sections: &[SectionId]) -> Vec<SectionId> {
    let mut keys = sections.to_vec();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Acquire every section lock before any row is written. Holding locks in a
/// fixed global order keeps two cross-section writers from deadlocking.
pub async fn lock_sections(
    tx: &mut dyn MenuTransaction,
    sections: &[SectionId],
) -> Result<Vec<SectionId>, DomainError> {
    let keys = lock_order(sections);
    for &section_id in &keys {
        let started = Instant::now();
        if let Err(e) = tx.lock_section(section_id).await {
            warn!(section_id, error = %e, "Section lock not acquired");
            return Err(e);
        }
        debug!(section_id, waited_ms = started.elapsed().as_millis() as u64, "Section lock acquired");
    }
    Ok(keys)
}
