use crate::domain::audit::AuditLogEntry;
use crate::domain::booking::{Booking, FinancialTransaction, Payment, Recharge};
use crate::domain::card::SmartCard;
use crate::domain::fare::Fare;
use crate::domain::ids::{
    BookingId, CardId, JourneyId, PaymentId, RechargeId, StationId, TicketId, TransactionId,
};
use crate::domain::journey::{Journey, JourneyMedia};
use crate::domain::ports::{FareSchedule, FareStore, StationDirectory};
use crate::domain::station::Station;
use crate::domain::ticket::Ticket;
use crate::domain::unit_of_work::{ChangeSet, Expect, Record, StagedWrite};
use crate::error::{FareError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    cards: HashMap<CardId, SmartCard>,
    tickets: HashMap<TicketId, Ticket>,
    tokens: HashMap<String, TicketId>,
    bookings: HashMap<BookingId, Booking>,
    payments: HashMap<PaymentId, Payment>,
    transactions: HashMap<TransactionId, FinancialTransaction>,
    recharges: HashMap<RechargeId, Recharge>,
    journeys: HashMap<JourneyId, Journey>,
    active: HashMap<JourneyMedia, JourneyId>,
    audit: Vec<AuditLogEntry>,
}

/// Compares the stored version (`None` when the row is missing) against the
/// precondition staged with the write.
pub(crate) fn check_expect(current: Option<u64>, write: &StagedWrite) -> Result<()> {
    let reason = match (write.expect, current) {
        (Expect::Absent, None) => return Ok(()),
        (Expect::Version(expected), Some(found)) if expected == found => return Ok(()),
        (Expect::Absent, Some(_)) => "already exists",
        (Expect::Version(_), None) => "no longer exists",
        (Expect::Version(_), Some(_)) => "was modified concurrently",
    };
    Err(FareError::ConcurrencyConflict(format!(
        "{} {reason}",
        write.record.describe()
    )))
}

impl Tables {
    fn check(&self, write: &StagedWrite) -> Result<()> {
        match &write.record {
            Record::Card(card) => check_expect(self.cards.get(&card.id).map(|c| c.version), write),
            Record::Ticket(ticket) => {
                check_expect(self.tickets.get(&ticket.id).map(|t| t.version), write)?;
                match self.tokens.get(&ticket.token) {
                    Some(owner) if *owner != ticket.id => Err(FareError::ConcurrencyConflict(
                        "ticket token collision".to_string(),
                    )),
                    _ => Ok(()),
                }
            }
            Record::Journey(journey) => {
                check_expect(self.journeys.get(&journey.id).map(|j| j.version), write)?;
                match self.active.get(&journey.media) {
                    Some(active) if journey.is_active() && *active != journey.id => {
                        Err(FareError::ConcurrencyConflict(format!(
                            "{} already has active journey {active}",
                            journey.media
                        )))
                    }
                    _ => Ok(()),
                }
            }
            Record::Booking(row) => check_expect(self.bookings.contains_key(&row.id).then_some(0), write),
            Record::Payment(row) => check_expect(self.payments.contains_key(&row.id).then_some(0), write),
            Record::Transaction(row) => {
                check_expect(self.transactions.contains_key(&row.id).then_some(0), write)
            }
            Record::Recharge(row) => check_expect(self.recharges.contains_key(&row.id).then_some(0), write),
        }
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Card(card) => {
                self.cards.insert(card.id.clone(), card);
            }
            Record::Ticket(ticket) => {
                self.tokens.insert(ticket.token.clone(), ticket.id);
                self.tickets.insert(ticket.id, ticket);
            }
            Record::Journey(journey) => {
                if journey.is_active() {
                    self.active.insert(journey.media.clone(), journey.id);
                } else if self.active.get(&journey.media) == Some(&journey.id) {
                    self.active.remove(&journey.media);
                }
                self.journeys.insert(journey.id, journey);
            }
            Record::Booking(row) => {
                self.bookings.insert(row.id, row);
            }
            Record::Payment(row) => {
                self.payments.insert(row.id, row);
            }
            Record::Transaction(row) => {
                self.transactions.insert(row.id, row);
            }
            Record::Recharge(row) => {
                self.recharges.insert(row.id, row);
            }
        }
    }
}

/// A thread-safe in-memory implementation of [`FareStore`].
///
/// All tables live behind one `Arc<RwLock<..>>`. Reads share the lock; a
/// commit takes the write lock only for the check-and-apply step, so the
/// preconditions and the writes are observed atomically by every reader.
/// Ideal for tests and single-process deployments.
#[derive(Default, Clone)]
pub struct InMemoryFareStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFareStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FareStore for InMemoryFareStore {
    async fn card(&self, id: &CardId) -> Result<Option<SmartCard>> {
        let tables = self.tables.read().await;
        Ok(tables.cards.get(id).cloned())
    }

    async fn cards(&self) -> Result<Vec<SmartCard>> {
        let tables = self.tables.read().await;
        let mut cards: Vec<SmartCard> = tables.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cards)
    }

    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables.tickets.get(&id).cloned())
    }

    async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.tickets.get(id))
            .cloned())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn journey(&self, id: JourneyId) -> Result<Option<Journey>> {
        let tables = self.tables.read().await;
        Ok(tables.journeys.get(&id).cloned())
    }

    async fn active_journey(&self, media: &JourneyMedia) -> Result<Option<Journey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active
            .get(media)
            .and_then(|id| tables.journeys.get(id))
            .cloned())
    }

    async fn audit_log(&self) -> Result<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.audit.clone())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let (writes, audit) = changes.into_parts();
        let mut tables = self.tables.write().await;
        for write in &writes {
            tables.check(write)?;
        }
        for write in writes {
            tables.apply(write.record);
        }
        tables.audit.extend(audit);
        Ok(())
    }
}

/// In-memory station directory, loaded from CSV by the CLI and from fixtures
/// in tests.
#[derive(Default, Clone)]
pub struct InMemoryStationDirectory {
    stations: Arc<RwLock<HashMap<StationId, Station>>>,
}

impl InMemoryStationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        let map = stations.into_iter().map(|s| (s.id, s)).collect();
        Self {
            stations: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn set_operational(&self, id: StationId, operational: bool) -> Result<()> {
        let mut stations = self.stations.write().await;
        let station = stations.get_mut(&id).ok_or(FareError::StationNotFound(id.0))?;
        station.operational = operational;
        Ok(())
    }
}

#[async_trait]
impl StationDirectory for InMemoryStationDirectory {
    async fn station(&self, id: StationId) -> Result<Option<Station>> {
        let stations = self.stations.read().await;
        Ok(stations.get(&id).cloned())
    }
}

/// In-memory fare table keyed by ordered station pair.
#[derive(Default, Clone)]
pub struct InMemoryFareSchedule {
    fares: Arc<RwLock<HashMap<(StationId, StationId), Vec<Fare>>>>,
}

impl InMemoryFareSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fares(fares: impl IntoIterator<Item = Fare>) -> Self {
        let mut map: HashMap<(StationId, StationId), Vec<Fare>> = HashMap::new();
        for fare in fares {
            map.entry((fare.source, fare.destination)).or_default().push(fare);
        }
        Self {
            fares: Arc::new(RwLock::new(map)),
        }
    }

    /// Adds a row; earlier rows for the pair are superseded, not replaced.
    pub async fn publish(&self, fare: Fare) {
        self.fares
            .write()
            .await
            .entry((fare.source, fare.destination))
            .or_default()
            .push(fare);
    }
}

#[async_trait]
impl FareSchedule for InMemoryFareSchedule {
    async fn fares_between(&self, source: StationId, destination: StationId) -> Result<Vec<Fare>> {
        let fares = self.fares.read().await;
        Ok(fares.get(&(source, destination)).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{AuditOperation, Auditable};
    use crate::domain::ids::AuditEntryId;
    use crate::domain::money::Balance;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn entry_for<T: Auditable>(row: &T) -> AuditLogEntry {
        AuditLogEntry {
            id: AuditEntryId::new(),
            entity_name: T::ENTITY_NAME.to_string(),
            operation: AuditOperation::Create,
            entity_id: row.entity_id(),
            before: None,
            after: Some(row.snapshot().unwrap()),
            actor_id: None,
            timestamp: Utc::now(),
        }
    }

    fn insert<T: Auditable + Clone + Into<Record>>(changes: &mut ChangeSet, row: &T) {
        changes.push(
            StagedWrite {
                record: row.clone().into(),
                expect: Expect::Absent,
            },
            entry_for(row),
        );
    }

    #[tokio::test]
    async fn test_commit_and_read_card() {
        let store = InMemoryFareStore::new();
        let mut card = SmartCard::new(CardId::new("C-1"), None, Utc::now());
        card.balance = Balance::new(dec!(100)).unwrap();

        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &card);
        store.commit(changes).await.unwrap();

        assert_eq!(store.card(&card.id).await.unwrap(), Some(card));
        assert!(store.card(&CardId::new("C-2")).await.unwrap().is_none());
        assert_eq!(store.audit_log().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_rejects_whole_change_set() {
        let store = InMemoryFareStore::new();
        let card = SmartCard::new(CardId::new("C-1"), None, Utc::now());
        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &card);
        store.commit(changes).await.unwrap();

        let now = Utc::now();
        let ticket = Ticket::issue(BookingId::new(), now, now + Duration::hours(1)).unwrap();
        let mut stale = card.clone();
        stale.version = 1;

        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &ticket);
        changes.push(
            StagedWrite {
                record: stale.clone().into(),
                expect: Expect::Version(7),
            },
            entry_for(&stale),
        );

        let result = store.commit(changes).await;
        assert!(matches!(result, Err(FareError::ConcurrencyConflict(_))));
        assert!(store.ticket(ticket.id).await.unwrap().is_none());
        assert_eq!(store.audit_log().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_active_journey_for_media_is_rejected() {
        let store = InMemoryFareStore::new();
        let media = JourneyMedia::Card(CardId::new("C-1"));
        let first = Journey::start(media.clone(), StationId(1), Utc::now());
        let second = Journey::start(media.clone(), StationId(2), Utc::now());

        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &first);
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &second);
        assert!(matches!(
            store.commit(changes).await,
            Err(FareError::ConcurrencyConflict(_))
        ));

        let active = store.active_journey(&media).await.unwrap().unwrap();
        assert_eq!(active.id, first.id);
    }

    #[tokio::test]
    async fn test_completed_journey_leaves_active_index() {
        let store = InMemoryFareStore::new();
        let media = JourneyMedia::Card(CardId::new("C-1"));
        let journey = Journey::start(media.clone(), StationId(1), Utc::now());

        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &journey);
        store.commit(changes).await.unwrap();

        let mut done = journey.clone();
        done.complete(
            StationId(2),
            journey.entry_time + Duration::minutes(5),
            Balance::ZERO,
        )
        .unwrap();
        done.version = 1;
        let mut changes = ChangeSet::new(None);
        changes.push(
            StagedWrite {
                record: done.clone().into(),
                expect: Expect::Version(0),
            },
            entry_for(&done),
        );
        store.commit(changes).await.unwrap();

        assert!(store.active_journey(&media).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ticket_lookup_by_token() {
        let store = InMemoryFareStore::new();
        let now = Utc::now();
        let ticket = Ticket::issue(BookingId::new(), now, now + Duration::hours(1)).unwrap();
        let mut changes = ChangeSet::new(None);
        insert(&mut changes, &ticket);
        store.commit(changes).await.unwrap();

        let found = store.ticket_by_token(&ticket.token).await.unwrap().unwrap();
        assert_eq!(found.id, ticket.id);
        assert!(store.ticket_by_token("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fare_schedule_keeps_superseded_rows() {
        let schedule = InMemoryFareSchedule::new();
        let now = Utc::now();
        for (amount, offset) in [(dec!(20), 10), (dec!(30), 1)] {
            schedule
                .publish(Fare {
                    source: StationId(1),
                    destination: StationId(2),
                    amount: Balance::new(amount).unwrap(),
                    effective_from: now - Duration::days(offset),
                    effective_until: None,
                })
                .await;
        }
        let rows = schedule.fares_between(StationId(1), StationId(2)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(schedule
            .fares_between(StationId(2), StationId(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_station_directory_toggle() {
        let directory = InMemoryStationDirectory::with_stations([Station {
            id: StationId(1),
            code: "CEN".into(),
            name: "Central".into(),
            operational: true,
        }]);
        directory.set_operational(StationId(1), false).await.unwrap();
        let station = directory.station(StationId(1)).await.unwrap().unwrap();
        assert!(!station.operational);
        assert!(directory.set_operational(StationId(9), true).await.is_err());
    }
}
