use super::ids::{CardId, UserId};
use super::money::{Amount, Balance};
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reloadable smart card and its balance of record.
///
/// Balance changes go through [`SmartCard::credit`] and [`SmartCard::debit`],
/// which keep the balance inside `[0, ceiling]`. `version` is bumped by every
/// committed update and used for optimistic concurrency control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartCard {
    pub id: CardId,
    /// `None` for anonymous cards.
    pub owner: Option<UserId>,
    pub balance: Balance,
    pub active: bool,
    pub issued_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl SmartCard {
    pub fn new(id: CardId, owner: Option<UserId>, issued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            balance: Balance::ZERO,
            active: true,
            issued_at,
            last_used_at: None,
            version: 0,
        }
    }

    /// Adds funds, refusing to cross the balance ceiling.
    pub fn credit(&mut self, amount: Amount, ceiling: Balance) -> Result<()> {
        let next = self.balance + amount;
        if next > ceiling {
            return Err(FareError::BalanceCeilingExceeded {
                attempted: next.value(),
                ceiling: ceiling.value(),
            });
        }
        self.balance = next;
        Ok(())
    }

    /// Takes funds for a ride and stamps the card as used.
    pub fn debit(&mut self, amount: Amount, at: DateTime<Utc>) -> Result<()> {
        if !self.active {
            return Err(FareError::CardInactive(self.id.to_string()));
        }
        let rest = self
            .balance
            .checked_sub(amount)
            .ok_or(FareError::InsufficientFunds {
                balance: self.balance.value(),
                required: amount.value(),
            })?;
        self.balance = rest;
        self.last_used_at = Some(at);
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        if !self.active {
            return Err(FareError::CardInactive(self.id.to_string()));
        }
        self.active = false;
        Ok(())
    }
}
