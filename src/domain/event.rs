use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventName {
    TicketBooked,
    CardRegistered,
    CardRecharged,
    JourneyEntry,
    JourneyExit,
    JourneyCancelled,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TicketBooked => "TicketBooked",
            EventName::CardRegistered => "CardRegistered",
            EventName::CardRecharged => "CardRecharged",
            EventName::JourneyEntry => "JourneyEntry",
            EventName::JourneyExit => "JourneyExit",
            EventName::JourneyCancelled => "JourneyCancelled",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fact pushed to the notification sink after its unit of work commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub name: EventName,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(name: EventName, timestamp: DateTime<Utc>, payload: Value) -> Self {
        Self {
            name,
            timestamp,
            payload,
        }
    }
}
