//! Recorded history rows

use crate::migration_id::MigrationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied migration as recorded in the version ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration identifier
    pub id: MigrationId,

    /// 1-based apply order
    pub seq: i64,

    /// When the forward operation committed
    pub applied_at: DateTime<Utc>,

    /// Checksum of the forward operation at apply time
    pub checksum: String,
}
