use crate::domain::ids::StationId;
use crate::domain::station::Station;
use crate::error::{FareError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct StationRecord {
    id: u32,
    code: String,
    name: String,
    #[serde(default = "default_operational")]
    operational: bool,
}

fn default_operational() -> bool {
    true
}

impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Station {
            id: StationId(record.id),
            code: record.code,
            name: record.name,
            operational: record.operational,
        }
    }
}

/// Reads the station directory from CSV: `id, code, name, operational`.
pub struct StationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> StationReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn stations(self) -> impl Iterator<Item = Result<Station>> {
        self.reader
            .into_deserialize::<StationRecord>()
            .map(|result| result.map(Station::from).map_err(FareError::from))
    }
}
