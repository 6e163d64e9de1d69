use crate::domain::audit::AuditLogEntry;
use crate::domain::booking::Booking;
use crate::domain::card::SmartCard;
use crate::domain::ids::{BookingId, CardId, JourneyId, TicketId};
use crate::domain::journey::{Journey, JourneyMedia};
use crate::domain::ports::FareStore;
use crate::domain::ticket::Ticket;
use crate::domain::unit_of_work::{ChangeSet, Record, StagedWrite};
use crate::error::{FareError, Result};
use crate::infrastructure::in_memory::check_expect;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CF_CARDS: &str = "cards";
pub const CF_TICKETS: &str = "tickets";
/// Ticket token -> ticket id.
pub const CF_TOKENS: &str = "ticket_tokens";
pub const CF_BOOKINGS: &str = "bookings";
pub const CF_PAYMENTS: &str = "payments";
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_RECHARGES: &str = "recharges";
pub const CF_JOURNEYS: &str = "journeys";
/// Media key -> id of its active journey.
pub const CF_ACTIVE: &str = "active_journeys";
/// Big-endian sequence number -> audit entry.
pub const CF_AUDIT: &str = "audit_log";

const COLUMN_FAMILIES: [&str; 10] = [
    CF_CARDS,
    CF_TICKETS,
    CF_TOKENS,
    CF_BOOKINGS,
    CF_PAYMENTS,
    CF_TRANSACTIONS,
    CF_RECHARGES,
    CF_JOURNEYS,
    CF_ACTIVE,
    CF_AUDIT,
];

/// A persistent [`FareStore`] backed by RocksDB.
///
/// Each entity lives in its own column family as JSON. A commit checks every
/// precondition under a process-local commit lock and then writes all rows,
/// index updates and audit entries in a single `WriteBatch`, so a crash never
/// leaves half a unit of work on disk.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    next_audit_seq: Arc<AtomicU64>,
}

fn uuid_key(id: &Uuid) -> [u8; 16] {
    *id.as_bytes()
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
            next_audit_seq: Arc::new(AtomicU64::new(0)),
        };
        let next = store.last_audit_seq()?.map_or(0, |seq| seq + 1);
        store.next_audit_seq.store(next, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| FareError::internal(format!("{name} column family not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn last_audit_seq(&self) -> Result<Option<u64>> {
        let cf = self.cf(CF_AUDIT)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _value) = item?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| FareError::internal("malformed audit key"))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    fn active_journey_id(&self, media: &JourneyMedia) -> Result<Option<JourneyId>> {
        let cf = self.cf(CF_ACTIVE)?;
        match self.db.get_cf(cf, media.key().as_bytes())? {
            Some(bytes) => {
                let id = Uuid::from_slice(&bytes)
                    .map_err(|_| FareError::internal("malformed active journey index"))?;
                Ok(Some(JourneyId::from_uuid(id)))
            }
            None => Ok(None),
        }
    }

    fn check(&self, write: &StagedWrite) -> Result<()> {
        match &write.record {
            Record::Card(card) => {
                let current: Option<SmartCard> = self.get_json(CF_CARDS, card.id.as_str().as_bytes())?;
                check_expect(current.map(|c| c.version), write)
            }
            Record::Ticket(ticket) => {
                let current: Option<Ticket> = self.get_json(CF_TICKETS, &uuid_key(ticket.id.as_uuid()))?;
                check_expect(current.map(|t| t.version), write)?;
                let cf = self.cf(CF_TOKENS)?;
                match self.db.get_cf(cf, ticket.token.as_bytes())? {
                    Some(owner) if owner.as_slice() != ticket.id.as_uuid().as_bytes() => Err(
                        FareError::ConcurrencyConflict("ticket token collision".to_string()),
                    ),
                    _ => Ok(()),
                }
            }
            Record::Journey(journey) => {
                let current: Option<Journey> =
                    self.get_json(CF_JOURNEYS, &uuid_key(journey.id.as_uuid()))?;
                check_expect(current.map(|j| j.version), write)?;
                match self.active_journey_id(&journey.media)? {
                    Some(active) if journey.is_active() && active != journey.id => {
                        Err(FareError::ConcurrencyConflict(format!(
                            "{} already has active journey {active}",
                            journey.media
                        )))
                    }
                    _ => Ok(()),
                }
            }
            Record::Booking(row) => check_expect(
                self.exists(CF_BOOKINGS, &uuid_key(row.id.as_uuid()))?.then_some(0),
                write,
            ),
            Record::Payment(row) => check_expect(
                self.exists(CF_PAYMENTS, &uuid_key(row.id.as_uuid()))?.then_some(0),
                write,
            ),
            Record::Transaction(row) => check_expect(
                self.exists(CF_TRANSACTIONS, &uuid_key(row.id.as_uuid()))?.then_some(0),
                write,
            ),
            Record::Recharge(row) => check_expect(
                self.exists(CF_RECHARGES, &uuid_key(row.id.as_uuid()))?.then_some(0),
                write,
            ),
        }
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8], row: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(row)?);
        Ok(())
    }

    fn stage(&self, batch: &mut WriteBatch, record: &Record) -> Result<()> {
        match record {
            Record::Card(card) => self.put(batch, CF_CARDS, card.id.as_str().as_bytes(), card),
            Record::Ticket(ticket) => {
                let key = uuid_key(ticket.id.as_uuid());
                batch.put_cf(self.cf(CF_TOKENS)?, ticket.token.as_bytes(), key);
                self.put(batch, CF_TICKETS, &key, ticket)
            }
            Record::Journey(journey) => {
                let key = uuid_key(journey.id.as_uuid());
                let media_key = journey.media.key();
                let active_cf = self.cf(CF_ACTIVE)?;
                if journey.is_active() {
                    batch.put_cf(active_cf, media_key.as_bytes(), key);
                } else if self.active_journey_id(&journey.media)? == Some(journey.id) {
                    batch.delete_cf(active_cf, media_key.as_bytes());
                }
                self.put(batch, CF_JOURNEYS, &key, journey)
            }
            Record::Booking(row) => self.put(batch, CF_BOOKINGS, &uuid_key(row.id.as_uuid()), row),
            Record::Payment(row) => self.put(batch, CF_PAYMENTS, &uuid_key(row.id.as_uuid()), row),
            Record::Transaction(row) => {
                self.put(batch, CF_TRANSACTIONS, &uuid_key(row.id.as_uuid()), row)
            }
            Record::Recharge(row) => self.put(batch, CF_RECHARGES, &uuid_key(row.id.as_uuid()), row),
        }
    }
}

#[async_trait]
impl FareStore for RocksDBStore {
    async fn card(&self, id: &CardId) -> Result<Option<SmartCard>> {
        self.get_json(CF_CARDS, id.as_str().as_bytes())
    }

    async fn cards(&self) -> Result<Vec<SmartCard>> {
        self.scan(CF_CARDS)
    }

    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.get_json(CF_TICKETS, &uuid_key(id.as_uuid()))
    }

    async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>> {
        let cf = self.cf(CF_TOKENS)?;
        match self.db.get_cf(cf, token.as_bytes())? {
            Some(id) => self.get_json(CF_TICKETS, &id),
            None => Ok(None),
        }
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        self.get_json(CF_BOOKINGS, &uuid_key(id.as_uuid()))
    }

    async fn journey(&self, id: JourneyId) -> Result<Option<Journey>> {
        self.get_json(CF_JOURNEYS, &uuid_key(id.as_uuid()))
    }

    async fn active_journey(&self, media: &JourneyMedia) -> Result<Option<Journey>> {
        match self.active_journey_id(media)? {
            Some(id) => self.get_json(CF_JOURNEYS, &uuid_key(id.as_uuid())),
            None => Ok(None),
        }
    }

    async fn audit_log(&self) -> Result<Vec<AuditLogEntry>> {
        self.scan(CF_AUDIT)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let (writes, audit) = changes.into_parts();
        let _guard = self.commit_lock.lock().await;

        for write in &writes {
            self.check(write)?;
        }

        let mut batch = WriteBatch::default();
        for write in &writes {
            self.stage(&mut batch, &write.record)?;
        }
        let audit_cf = self.cf(CF_AUDIT)?;
        let first_seq = self.next_audit_seq.load(Ordering::SeqCst);
        for (offset, entry) in audit.iter().enumerate() {
            let seq = first_seq + offset as u64;
            batch.put_cf(audit_cf, seq.to_be_bytes(), serde_json::to_vec(entry)?);
        }

        self.db.write(batch)?;
        self.next_audit_seq
            .store(first_seq + audit.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::AuditRecorder;
    use crate::domain::ids::StationId;
    use crate::domain::money::{Amount, Balance};
    use crate::infrastructure::clock::SystemClock;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn recorder() -> AuditRecorder {
        AuditRecorder::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_card_commit_and_conflict() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let audit = recorder();

        let card = SmartCard::new(CardId::new("C-1"), None, Utc::now());
        let mut changes = ChangeSet::new(None);
        audit.stage_insert(&mut changes, card.clone()).unwrap();
        store.commit(changes).await.unwrap();

        let mut credited = card.clone();
        credited
            .credit(Amount::new(dec!(50)).unwrap(), Balance::new(dec!(10000)).unwrap())
            .unwrap();
        let mut changes = ChangeSet::new(None);
        audit.stage_update(&mut changes, &card, credited.clone()).unwrap();
        store.commit(changes).await.unwrap();

        // A second update built from the stale read must lose.
        let mut changes = ChangeSet::new(None);
        audit.stage_update(&mut changes, &card, credited).unwrap();
        assert!(matches!(
            store.commit(changes).await,
            Err(FareError::ConcurrencyConflict(_))
        ));

        let stored = store.card(&card.id).await.unwrap().unwrap();
        assert_eq!(stored.balance.value(), dec!(50));
        assert_eq!(stored.version, 1);
        assert_eq!(store.audit_log().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rocksdb_active_index_and_reopen() {
        let dir = tempdir().unwrap();
        let media = JourneyMedia::Card(CardId::new("C-1"));
        let journey = Journey::start(media.clone(), StationId(1), Utc::now());
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let mut changes = ChangeSet::new(None);
            recorder().stage_insert(&mut changes, journey.clone()).unwrap();
            store.commit(changes).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let active = store.active_journey(&media).await.unwrap().unwrap();
        assert_eq!(active.id, journey.id);

        let mut done = active.clone();
        done.complete(StationId(2), active.entry_time + Duration::minutes(5), Balance::ZERO)
            .unwrap();
        let mut changes = ChangeSet::new(None);
        recorder().stage_update(&mut changes, &active, done).unwrap();
        store.commit(changes).await.unwrap();

        assert!(store.active_journey(&media).await.unwrap().is_none());
        let log = store.audit_log().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].entity_id, journey.id.to_string());
    }
}
