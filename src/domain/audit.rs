use super::booking::{Booking, FinancialTransaction, Payment, Recharge};
use super::card::SmartCard;
use super::ids::AuditEntryId;
use super::journey::Journey;
use super::ticket::Ticket;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

/// Append-only record of one entity mutation. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub entity_name: String,
    pub operation: AuditOperation,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub actor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An entity that can be written to the audit trail.
pub trait Auditable: Serialize {
    const ENTITY_NAME: &'static str;

    fn entity_id(&self) -> String;

    fn snapshot(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Auditable for SmartCard {
    const ENTITY_NAME: &'static str = "smart_card";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Auditable for Ticket {
    const ENTITY_NAME: &'static str = "ticket";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    /// The token is a bearer credential and stays out of the audit trail.
    fn snapshot(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("token");
        }
        Ok(value)
    }
}

impl Auditable for Journey {
    const ENTITY_NAME: &'static str = "journey";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Auditable for Booking {
    const ENTITY_NAME: &'static str = "booking";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Auditable for Payment {
    const ENTITY_NAME: &'static str = "payment";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Auditable for FinancialTransaction {
    const ENTITY_NAME: &'static str = "transaction";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Auditable for Recharge {
    const ENTITY_NAME: &'static str = "recharge";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}
