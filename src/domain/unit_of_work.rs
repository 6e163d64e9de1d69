//! The write set of one atomic unit of work.
//!
//! Services never write to a store directly. They read, decide, and stage
//! every row they want to change into a [`ChangeSet`] together with its audit
//! entry and the events to publish. The store then commits the whole set or
//! nothing.

use super::audit::{AuditLogEntry, Auditable};
use super::booking::{Booking, FinancialTransaction, Payment, Recharge};
use super::card::SmartCard;
use super::event::DomainEvent;
use super::journey::Journey;
use super::ticket::Ticket;

/// Precondition a store checks before applying a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The row must not exist yet.
    Absent,
    /// The stored row must still carry this version.
    Version(u64),
}

/// Rows that are updated in place carry a version for optimistic locking.
pub trait Versioned {
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

macro_rules! versioned {
    ($($ty:ty),*) => {
        $(impl Versioned for $ty {
            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        })*
    };
}

versioned!(SmartCard, Ticket, Journey);

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Card(SmartCard),
    Ticket(Ticket),
    Journey(Journey),
    Booking(Booking),
    Payment(Payment),
    Transaction(FinancialTransaction),
    Recharge(Recharge),
}

impl Record {
    /// `entity_name:id`, used in conflict messages and logs.
    pub fn describe(&self) -> String {
        fn label<T: Auditable>(row: &T) -> String {
            format!("{}:{}", T::ENTITY_NAME, row.entity_id())
        }
        match self {
            Record::Card(r) => label(r),
            Record::Ticket(r) => label(r),
            Record::Journey(r) => label(r),
            Record::Booking(r) => label(r),
            Record::Payment(r) => label(r),
            Record::Transaction(r) => label(r),
            Record::Recharge(r) => label(r),
        }
    }
}

macro_rules! into_record {
    ($($ty:ty => $variant:ident),*) => {
        $(impl From<$ty> for Record {
            fn from(row: $ty) -> Self {
                Record::$variant(row)
            }
        })*
    };
}

into_record!(
    SmartCard => Card,
    Ticket => Ticket,
    Journey => Journey,
    Booking => Booking,
    Payment => Payment,
    FinancialTransaction => Transaction,
    Recharge => Recharge
);

#[derive(Debug, Clone, PartialEq)]
pub struct StagedWrite {
    pub record: Record,
    pub expect: Expect,
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    actor: Option<String>,
    writes: Vec<StagedWrite>,
    audit: Vec<AuditLogEntry>,
    events: Vec<DomainEvent>,
}

impl ChangeSet {
    pub fn new(actor: Option<String>) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Writes and their audit entries only travel together.
    pub(crate) fn push(&mut self, write: StagedWrite, entry: AuditLogEntry) {
        self.writes.push(write);
        self.audit.push(entry);
    }

    pub fn emit(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn writes(&self) -> &[StagedWrite] {
        &self.writes
    }

    pub fn audit_entries(&self) -> &[AuditLogEntry] {
        &self.audit
    }

    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Detaches the events so they can be published once the commit lands.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn into_parts(self) -> (Vec<StagedWrite>, Vec<AuditLogEntry>) {
        (self.writes, self.audit)
    }
}
