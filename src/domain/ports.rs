use super::audit::AuditLogEntry;
use super::booking::{Booking, PaymentMethod};
use super::card::SmartCard;
use super::event::DomainEvent;
use super::fare::Fare;
use super::ids::{BookingId, CardId, JourneyId, StationId, TicketId, UserId};
use super::journey::{Journey, JourneyMedia};
use super::money::Amount;
use super::station::Station;
use super::ticket::Ticket;
use super::unit_of_work::ChangeSet;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Transactional datastore behind the core.
///
/// Reads are plain lookups. All writes go through [`FareStore::commit`],
/// which must apply a [`ChangeSet`] atomically: either every staged write
/// and audit entry lands, or none does. Implementations reject a change set
/// with `ConcurrencyConflict` when a versioned row moved since it was read,
/// when a media would end up with two active journeys, or when a ticket
/// token is already taken.
#[async_trait]
pub trait FareStore: Send + Sync {
    async fn card(&self, id: &CardId) -> Result<Option<SmartCard>>;
    async fn cards(&self) -> Result<Vec<SmartCard>>;
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>>;
    async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>>;
    async fn booking(&self, id: BookingId) -> Result<Option<Booking>>;
    async fn journey(&self, id: JourneyId) -> Result<Option<Journey>>;
    async fn active_journey(&self, media: &JourneyMedia) -> Result<Option<Journey>>;
    /// Full audit trail in append order.
    async fn audit_log(&self) -> Result<Vec<AuditLogEntry>>;
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Read-only view of the externally managed station directory.
#[async_trait]
pub trait StationDirectory: Send + Sync {
    async fn station(&self, id: StationId) -> Result<Option<Station>>;
}

/// Read-only view of the externally managed fare table.
#[async_trait]
pub trait FareSchedule: Send + Sync {
    /// Every row on record for the ordered pair, effective or not.
    async fn fares_between(&self, source: StationId, destination: StationId) -> Result<Vec<Fare>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// Synchronous payment gateway. The core never retries a decline.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, user: &UserId, amount: Amount, method: PaymentMethod) -> Result<PaymentOutcome>;

    /// Reverses an approved charge whose unit of work failed to commit.
    async fn refund(&self, reference: &str) -> Result<()>;
}

/// Receiver of domain events. Delivery is best effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type FareStoreRef = Arc<dyn FareStore>;
pub type StationDirectoryRef = Arc<dyn StationDirectory>;
pub type FareScheduleRef = Arc<dyn FareSchedule>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type ClockRef = Arc<dyn Clock>;
