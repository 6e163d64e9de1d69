use crate::domain::audit::{AuditLogEntry, AuditOperation, Auditable};
use crate::domain::ids::AuditEntryId;
use crate::domain::ports::{ClockRef, FareStore};
use crate::domain::unit_of_work::{ChangeSet, Expect, Record, StagedWrite, Versioned};
use crate::error::Result;
use serde_json::Value;

/// Stages mutations together with their audit entries.
///
/// Every write a service makes passes through [`AuditRecorder::stage_insert`]
/// or [`AuditRecorder::stage_update`], so a committed row always has exactly
/// one matching audit entry in the same unit of work.
pub struct AuditRecorder {
    clock: ClockRef,
}

impl AuditRecorder {
    pub fn new(clock: ClockRef) -> Self {
        Self { clock }
    }

    fn entry<T: Auditable>(
        &self,
        changes: &ChangeSet,
        operation: AuditOperation,
        entity_id: String,
        before: Option<Value>,
        after: Option<Value>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            id: AuditEntryId::new(),
            entity_name: T::ENTITY_NAME.to_string(),
            operation,
            entity_id,
            before,
            after,
            actor_id: changes.actor().map(str::to_string),
            timestamp: self.clock.now(),
        }
    }

    /// Stages a new row that must not exist yet.
    pub fn stage_insert<T>(&self, changes: &mut ChangeSet, row: T) -> Result<()>
    where
        T: Auditable + Into<Record>,
    {
        let entry = self.entry::<T>(
            changes,
            AuditOperation::Create,
            row.entity_id(),
            None,
            Some(row.snapshot()?),
        );
        changes.push(
            StagedWrite {
                record: row.into(),
                expect: Expect::Absent,
            },
            entry,
        );
        Ok(())
    }

    /// Stages `after` as the successor of `before`, bumping its version.
    /// The commit fails if the stored row no longer carries `before`'s
    /// version. Returns the row as it will be stored.
    pub fn stage_update<T>(&self, changes: &mut ChangeSet, before: &T, mut after: T) -> Result<T>
    where
        T: Auditable + Versioned + Clone + Into<Record>,
    {
        after.set_version(before.version() + 1);
        let entry = self.entry::<T>(
            changes,
            AuditOperation::Update,
            after.entity_id(),
            Some(before.snapshot()?),
            Some(after.snapshot()?),
        );
        changes.push(
            StagedWrite {
                record: after.clone().into(),
                expect: Expect::Version(before.version()),
            },
            entry,
        );
        Ok(after)
    }

    /// Audit entries of one entity, oldest first.
    pub async fn history(
        &self,
        store: &dyn FareStore,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>> {
        let log = store.audit_log().await?;
        Ok(log
            .into_iter()
            .filter(|e| e.entity_name == entity_name && e.entity_id == entity_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::SmartCard;
    use crate::domain::ids::CardId;
    use crate::domain::money::{Amount, Balance};
    use crate::infrastructure::clock::ManualClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_update_carries_both_snapshots_and_bumps_version() {
        let now = Utc::now();
        let recorder = AuditRecorder::new(Arc::new(ManualClock::new(now)));
        let card = SmartCard::new(CardId::new("C-1"), None, now);
        let mut credited = card.clone();
        credited
            .credit(Amount::new(dec!(25)).unwrap(), Balance::new(dec!(10000)).unwrap())
            .unwrap();

        let mut changes = ChangeSet::new(Some("user-7".to_string()));
        let staged = recorder.stage_update(&mut changes, &card, credited).unwrap();
        assert_eq!(staged.version, 1);

        let write = &changes.writes()[0];
        assert_eq!(write.expect, Expect::Version(0));

        let entry = &changes.audit_entries()[0];
        assert_eq!(entry.operation, AuditOperation::Update);
        assert_eq!(entry.entity_name, "smart_card");
        assert_eq!(entry.entity_id, "C-1");
        assert_eq!(entry.actor_id.as_deref(), Some("user-7"));
        assert_eq!(entry.timestamp, now);
        assert_eq!(entry.before.as_ref().unwrap()["balance"], serde_json::json!("0"));
        assert_eq!(entry.after.as_ref().unwrap()["balance"], serde_json::json!("25"));
    }

    #[test]
    fn test_insert_has_no_before_snapshot() {
        let recorder = AuditRecorder::new(Arc::new(ManualClock::new(Utc::now())));
        let card = SmartCard::new(CardId::new("C-2"), None, Utc::now());
        let mut changes = ChangeSet::new(None);
        recorder.stage_insert(&mut changes, card).unwrap();

        let entry = &changes.audit_entries()[0];
        assert_eq!(entry.operation, AuditOperation::Create);
        assert!(entry.before.is_none());
        assert!(entry.after.is_some());
        assert_eq!(changes.writes()[0].expect, Expect::Absent);
    }
}
