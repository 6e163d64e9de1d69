use super::audit::AuditRecorder;
use super::commit::Committer;
use crate::domain::card::SmartCard;
use crate::domain::event::{DomainEvent, EventName};
use crate::domain::ids::{CardId, UserId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{ClockRef, FareStoreRef};
use crate::domain::unit_of_work::ChangeSet;
use crate::error::{FareError, Result};
use crate::infrastructure::config::LedgerConfig;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Balance-of-record for smart cards.
///
/// This is the only component that writes a card's balance. The `stage_*`
/// forms add the balance change to a caller's unit of work; the plain forms
/// run as their own unit.
pub struct LedgerService {
    store: FareStoreRef,
    audit: Arc<AuditRecorder>,
    committer: Arc<Committer>,
    clock: ClockRef,
    ceiling: Balance,
    entry_floor: Balance,
}

impl LedgerService {
    pub fn new(
        store: FareStoreRef,
        audit: Arc<AuditRecorder>,
        committer: Arc<Committer>,
        clock: ClockRef,
        limits: &LedgerConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            audit,
            committer,
            clock,
            ceiling: Balance::new(limits.max_balance)?,
            entry_floor: Balance::new(limits.min_entry_balance)?,
        })
    }

    async fn load(&self, card_id: &CardId) -> Result<SmartCard> {
        self.store
            .card(card_id)
            .await?
            .ok_or_else(|| FareError::CardNotFound(card_id.to_string()))
    }

    /// Registers a new card with a zero balance.
    pub async fn issue_card(&self, card_id: CardId, owner: Option<UserId>) -> Result<SmartCard> {
        if self.store.card(&card_id).await?.is_some() {
            return Err(FareError::ValidationError(format!(
                "card {card_id} is already registered"
            )));
        }
        let now = self.clock.now();
        let card = SmartCard::new(card_id, owner, now);

        let mut changes = ChangeSet::new(card.owner.as_ref().map(UserId::to_string));
        self.audit.stage_insert(&mut changes, card.clone())?;
        changes.emit(DomainEvent::new(
            EventName::CardRegistered,
            now,
            json!({
                "card_id": card.id,
                "owner": card.owner,
            }),
        ));
        self.committer.commit(changes).await?;

        info!(card = %card.id, anonymous = card.owner.is_none(), "card_registered");
        Ok(card)
    }

    /// Cards are never deleted; deactivation blocks further travel.
    pub async fn deactivate_card(&self, card_id: &CardId) -> Result<SmartCard> {
        let card = self.load(card_id).await?;
        let mut inactive = card.clone();
        inactive.deactivate()?;

        let mut changes = ChangeSet::new(None);
        let stored = self.audit.stage_update(&mut changes, &card, inactive)?;
        self.committer.commit(changes).await?;

        info!(card = %card_id, "card_deactivated");
        Ok(stored)
    }

    pub async fn balance(&self, card_id: &CardId) -> Result<Balance> {
        Ok(self.load(card_id).await?.balance)
    }

    /// Rejects cards that cannot pay the minimum fare at an entry gate.
    pub fn check_entry_floor(&self, card: &SmartCard) -> Result<()> {
        if card.balance < self.entry_floor {
            return Err(FareError::InsufficientFunds {
                balance: card.balance.value(),
                required: self.entry_floor.value(),
            });
        }
        Ok(())
    }

    pub async fn stage_credit(
        &self,
        changes: &mut ChangeSet,
        card_id: &CardId,
        amount: Amount,
    ) -> Result<SmartCard> {
        let card = self.load(card_id).await?;
        let mut credited = card.clone();
        credited.credit(amount, self.ceiling)?;
        self.audit.stage_update(changes, &card, credited)
    }

    pub async fn stage_debit(
        &self,
        changes: &mut ChangeSet,
        card_id: &CardId,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<SmartCard> {
        let card = self.load(card_id).await?;
        let mut debited = card.clone();
        debited.debit(amount, at)?;
        self.audit.stage_update(changes, &card, debited)
    }

    pub async fn credit(&self, card_id: &CardId, amount: Amount) -> Result<SmartCard> {
        let mut changes = ChangeSet::new(None);
        let card = self.stage_credit(&mut changes, card_id, amount).await?;
        self.committer.commit(changes).await?;
        info!(card = %card_id, %amount, balance = %card.balance, "card_credited");
        Ok(card)
    }

    /// Check-and-subtract as one unit: a concurrent change to the same card
    /// between the read and the commit surfaces as `ConcurrencyConflict`.
    pub async fn debit(&self, card_id: &CardId, amount: Amount) -> Result<SmartCard> {
        let mut changes = ChangeSet::new(None);
        let card = self
            .stage_debit(&mut changes, card_id, amount, self.clock.now())
            .await?;
        self.committer.commit(changes).await?;
        info!(card = %card_id, %amount, balance = %card.balance, "card_debited");
        Ok(card)
    }
}
