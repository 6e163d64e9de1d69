use super::ids::StationId;
use serde::{Deserialize, Serialize};

/// A station as published by the station directory. The core never writes
/// stations; it only asks whether they exist and accept passengers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub code: String,
    pub name: String,
    pub operational: bool,
}
