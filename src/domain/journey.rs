use super::ids::{CardId, JourneyId, StationId, TicketId};
use super::money::Balance;
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media presented at a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Ticket,
    Card,
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ticket" => Ok(MediaKind::Ticket),
            "card" => Ok(MediaKind::Card),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

/// The media a journey is paid with. Exactly one reference, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum JourneyMedia {
    Ticket(TicketId),
    Card(CardId),
}

impl JourneyMedia {
    pub fn kind(&self) -> MediaKind {
        match self {
            JourneyMedia::Ticket(_) => MediaKind::Ticket,
            JourneyMedia::Card(_) => MediaKind::Card,
        }
    }

    /// Stable key used by stores to index the active journey of a media.
    pub fn key(&self) -> String {
        match self {
            JourneyMedia::Ticket(id) => format!("ticket:{id}"),
            JourneyMedia::Card(id) => format!("card:{id}"),
        }
    }
}

impl fmt::Display for JourneyMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyStatus {
    Active,
    Completed,
    Cancelled,
}

/// One tracked passage from an entry scan to an exit (or cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub id: JourneyId,
    pub media: JourneyMedia,
    pub entry_station: StationId,
    pub entry_time: DateTime<Utc>,
    pub exit_station: Option<StationId>,
    pub exit_time: Option<DateTime<Utc>>,
    /// Set only on completion.
    pub fare_deducted: Option<Balance>,
    pub status: JourneyStatus,
    pub version: u64,
}

impl Journey {
    pub fn start(media: JourneyMedia, entry_station: StationId, entry_time: DateTime<Utc>) -> Self {
        Self {
            id: JourneyId::new(),
            media,
            entry_station,
            entry_time,
            exit_station: None,
            exit_time: None,
            fare_deducted: None,
            status: JourneyStatus::Active,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == JourneyStatus::Active
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(FareError::JourneyNotActive(self.id.to_string()))
        }
    }

    /// Active -> Completed. Exit time must fall strictly after entry.
    pub fn complete(&mut self, exit_station: StationId, at: DateTime<Utc>, fare: Balance) -> Result<()> {
        self.ensure_active()?;
        if at <= self.entry_time {
            return Err(FareError::ValidationError(format!(
                "exit time {at} is not after entry time {}",
                self.entry_time
            )));
        }
        self.exit_station = Some(exit_station);
        self.exit_time = Some(at);
        self.fare_deducted = Some(fare);
        self.status = JourneyStatus::Completed;
        Ok(())
    }

    /// Active -> Cancelled. No fare is settled.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = JourneyStatus::Cancelled;
        Ok(())
    }
}
