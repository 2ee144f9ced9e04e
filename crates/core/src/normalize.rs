use tracing::warn;

use crate::model::QuotaRecord;

/// A percentage exists only when its soft limit is above zero.
pub fn normalize(mut record: QuotaRecord) -> QuotaRecord {
    record.blocks_pct = percentage(&record, "blocks", record.blocks_used, record.blocks_soft);
    record.files_pct = percentage(&record, "files", record.files_used, record.files_soft);
    record
}

fn percentage(
    record: &QuotaRecord,
    dimension: &str,
    used: Option<u64>,
    soft: Option<u64>,
) -> Option<f64> {
    match (used, soft) {
        (_, None) | (_, Some(0)) => None,
        (Some(used), Some(soft)) => Some(round2(used as f64 * 100.0 / soft as f64)),
        (None, Some(_)) => {
            warn!(
                "cannot compute {dimension} percentage for {} on {}: usage unknown",
                record.user, record.path
            );
            None
        }
    }
}

// Ties go to the even digit, so 0.125 reports as 0.12.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
