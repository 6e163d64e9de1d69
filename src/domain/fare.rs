use super::ids::StationId;
use super::money::Balance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the fare schedule for an ordered station pair.
///
/// Rows are immutable. A price change is published by inserting a new row
/// with a later `effective_from`; the older row stays on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub source: StationId,
    pub destination: StationId,
    pub amount: Balance,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
}

impl Fare {
    /// Whether this row is in force at `as_of`.
    pub fn is_effective_at(&self, as_of: DateTime<Utc>) -> bool {
        self.effective_from <= as_of && self.effective_until.is_none_or(|until| until > as_of)
    }
}

/// Picks the row in force at `as_of`: the latest `effective_from` among the
/// rows that have started and not yet expired.
pub fn select_effective(fares: &[Fare], as_of: DateTime<Utc>) -> Option<&Fare> {
    fares
        .iter()
        .filter(|fare| fare.is_effective_at(as_of))
        .max_by_key(|fare| fare.effective_from)
}
