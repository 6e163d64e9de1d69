use crate::domain::fare::Fare;
use crate::domain::ids::StationId;
use crate::domain::money::Balance;
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct FareRecord {
    source: u32,
    destination: u32,
    amount: Decimal,
    effective_from: DateTime<Utc>,
    effective_until: Option<DateTime<Utc>>,
}

impl TryFrom<FareRecord> for Fare {
    type Error = FareError;

    fn try_from(record: FareRecord) -> Result<Self> {
        if record
            .effective_until
            .is_some_and(|until| until <= record.effective_from)
        {
            return Err(FareError::ValidationError(format!(
                "fare {} -> {} expires before it starts",
                record.source, record.destination
            )));
        }
        Ok(Fare {
            source: StationId(record.source),
            destination: StationId(record.destination),
            amount: Balance::new(record.amount)?,
            effective_from: record.effective_from,
            effective_until: record.effective_until,
        })
    }
}

/// Reads fare rows from CSV:
/// `source, destination, amount, effective_from, effective_until`.
///
/// Timestamps are RFC 3339. An empty `effective_until` means open-ended.
pub struct FareReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> FareReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn fares(self) -> impl Iterator<Item = Result<Fare>> {
        self.reader
            .into_deserialize::<FareRecord>()
            .map(|result| result.map_err(FareError::from).and_then(Fare::try_from))
    }
}
