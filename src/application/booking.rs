use super::audit::AuditRecorder;
use super::commit::Committer;
use super::fare_calculator::FareCalculator;
use super::ledger::LedgerService;
use crate::domain::booking::{
    Booking, FinancialTransaction, Payment, PaymentMethod, PaymentStatus, Recharge, TransactionKind,
};
use crate::domain::event::{DomainEvent, EventName};
use crate::domain::ids::{
    BookingId, CardId, PaymentId, RechargeId, StationId, TicketId, TransactionId, UserId,
};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{ClockRef, PaymentGatewayRef, PaymentOutcome, StationDirectoryRef};
use crate::domain::ticket::Ticket;
use crate::domain::unit_of_work::ChangeSet;
use crate::error::{FareError, Result};
use crate::infrastructure::config::{BookingConfig, RechargeConfig};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handed to the passenger after a successful booking. `token` is what the
/// QR code encodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketDetails {
    pub ticket_id: TicketId,
    pub booking_id: BookingId,
    pub token: String,
    pub source: StationId,
    pub destination: StationId,
    pub fare: Amount,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub payment_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RechargeReceipt {
    pub recharge_id: RechargeId,
    pub card_id: CardId,
    pub amount: Amount,
    pub new_balance: Balance,
    pub payment_reference: String,
}

/// Passenger purchases: QR tickets and card top-ups. Each purchase is one
/// unit of work committed only after the gateway approved the charge.
pub struct BookingService {
    stations: StationDirectoryRef,
    fares: Arc<FareCalculator>,
    ledger: Arc<LedgerService>,
    payments: PaymentGatewayRef,
    audit: Arc<AuditRecorder>,
    committer: Arc<Committer>,
    clock: ClockRef,
    booking: BookingConfig,
    recharge: RechargeConfig,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stations: StationDirectoryRef,
        fares: Arc<FareCalculator>,
        ledger: Arc<LedgerService>,
        payments: PaymentGatewayRef,
        audit: Arc<AuditRecorder>,
        committer: Arc<Committer>,
        clock: ClockRef,
        booking: BookingConfig,
        recharge: RechargeConfig,
    ) -> Self {
        Self {
            stations,
            fares,
            ledger,
            payments,
            audit,
            committer,
            clock,
            booking,
            recharge,
        }
    }

    async fn ensure_station(&self, id: StationId) -> Result<()> {
        self.stations
            .station(id)
            .await?
            .map(|_| ())
            .ok_or(FareError::StationNotFound(id.0))
    }

    async fn charge(&self, user: &UserId, amount: Amount, method: PaymentMethod) -> Result<String> {
        match self.payments.charge(user, amount, method).await? {
            PaymentOutcome::Approved { reference } => Ok(reference),
            PaymentOutcome::Declined { reason } => {
                warn!(%user, %amount, %method, %reason, "payment_declined");
                Err(FareError::PaymentDeclined(reason))
            }
        }
    }

    /// Commits the unit of work staged after an approved charge. If staging
    /// or the commit fails, the charge is reversed so the passenger is never
    /// billed for rows that were not written.
    async fn commit_charged<T>(&self, reference: &str, staged: Result<(ChangeSet, T)>) -> Result<T> {
        let result = match staged {
            Ok((changes, value)) => self.committer.commit(changes).await.map(|()| value),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(reference, error = %err, "charge_refunded");
            if let Err(refund_err) = self.payments.refund(reference).await {
                error!(reference, error = %refund_err, "refund_failed");
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_payment(
        &self,
        changes: &mut ChangeSet,
        user: &UserId,
        amount: Amount,
        method: PaymentMethod,
        kind: TransactionKind,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<(TransactionId, PaymentId)> {
        let transaction = FinancialTransaction {
            id: TransactionId::new(),
            user: user.clone(),
            amount,
            kind,
            created_at: now,
        };
        let payment = Payment {
            id: PaymentId::new(),
            transaction_id: transaction.id,
            user: user.clone(),
            amount,
            method,
            status: PaymentStatus::Success,
            reference,
            created_at: now,
        };
        let ids = (transaction.id, payment.id);
        self.audit.stage_insert(changes, transaction)?;
        self.audit.stage_insert(changes, payment)?;
        Ok(ids)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_ticket_purchase(
        &self,
        user: &UserId,
        source: StationId,
        destination: StationId,
        fare: Amount,
        method: PaymentMethod,
        reference: String,
        validity_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<(ChangeSet, (Booking, Ticket))> {
        let mut changes = ChangeSet::new(Some(user.to_string()));
        let (transaction_id, _) = self.stage_payment(
            &mut changes,
            user,
            fare,
            method,
            TransactionKind::Booking,
            reference,
            now,
        )?;
        let booking = Booking {
            id: BookingId::new(),
            transaction_id,
            user: user.clone(),
            source,
            destination,
            total_fare: fare,
            created_at: now,
        };
        let ticket = Ticket::issue(
            booking.id,
            now,
            now + Duration::hours(i64::from(validity_hours)),
        )?;
        self.audit.stage_insert(&mut changes, booking.clone())?;
        self.audit.stage_insert(&mut changes, ticket.clone())?;
        changes.emit(DomainEvent::new(
            EventName::TicketBooked,
            now,
            json!({
                "booking_id": booking.id,
                "ticket_id": ticket.id,
                "user_id": user,
                "source_station_id": source,
                "destination_station_id": destination,
                "fare": fare,
                "valid_until": ticket.valid_until,
            }),
        ));
        Ok((changes, (booking, ticket)))
    }

    /// Adds the payment rows and the recharge record to a change set that
    /// already carries the card credit.
    #[allow(clippy::too_many_arguments)]
    fn stage_recharge(
        &self,
        mut changes: ChangeSet,
        user: &UserId,
        card_id: &CardId,
        amount: Amount,
        new_balance: Balance,
        method: PaymentMethod,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<(ChangeSet, Recharge)> {
        let (transaction_id, payment_id) = self.stage_payment(
            &mut changes,
            user,
            amount,
            method,
            TransactionKind::Recharge,
            reference,
            now,
        )?;
        let recharge = Recharge {
            id: RechargeId::new(),
            card_id: card_id.clone(),
            transaction_id,
            payment_id,
            amount,
            created_at: now,
        };
        self.audit.stage_insert(&mut changes, recharge.clone())?;
        changes.emit(DomainEvent::new(
            EventName::CardRecharged,
            now,
            json!({
                "recharge_id": recharge.id,
                "card_id": card_id,
                "user_id": user,
                "amount": amount,
                "new_balance": new_balance,
            }),
        ));
        Ok((changes, recharge))
    }

    pub async fn book_ticket(
        &self,
        user: &UserId,
        source: StationId,
        destination: StationId,
        method: PaymentMethod,
        validity_hours: u32,
    ) -> Result<TicketDetails> {
        if source == destination {
            return Err(FareError::InvalidRoute(source.0));
        }
        self.ensure_station(source).await?;
        self.ensure_station(destination).await?;
        if validity_hours == 0 || validity_hours > self.booking.max_validity_hours {
            return Err(FareError::ValidationError(format!(
                "validity must be between 1 and {} hours, got {validity_hours}",
                self.booking.max_validity_hours
            )));
        }

        let now = self.clock.now();
        let fare = self.fares.required_fare(source, destination, now).await?;
        let reference = self.charge(user, fare, method).await?;

        let staged = self.stage_ticket_purchase(
            user,
            source,
            destination,
            fare,
            method,
            reference.clone(),
            validity_hours,
            now,
        );
        let (booking, ticket) = self.commit_charged(&reference, staged).await?;

        info!(%user, booking = %booking.id, %source, %destination, %fare, "ticket_booked");
        Ok(TicketDetails {
            ticket_id: ticket.id,
            booking_id: booking.id,
            token: ticket.token,
            source,
            destination,
            fare,
            valid_from: ticket.valid_from,
            valid_until: ticket.valid_until,
            payment_reference: reference,
        })
    }

    pub async fn recharge_card(
        &self,
        user: &UserId,
        card_id: &CardId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<RechargeReceipt> {
        if amount < self.recharge.min_amount || amount > self.recharge.max_amount {
            return Err(FareError::ValidationError(format!(
                "recharge amount must be between {} and {}, got {amount}",
                self.recharge.min_amount, self.recharge.max_amount
            )));
        }
        let amount = Amount::new(amount)?;

        // Staging the credit first rejects unknown cards and ceiling breaches
        // before any money is taken.
        let mut changes = ChangeSet::new(Some(user.to_string()));
        let card = self.ledger.stage_credit(&mut changes, card_id, amount).await?;

        let now = self.clock.now();
        let reference = self.charge(user, amount, method).await?;
        let staged = self.stage_recharge(
            changes,
            user,
            card_id,
            amount,
            card.balance,
            method,
            reference.clone(),
            now,
        );
        let recharge = self.commit_charged(&reference, staged).await?;

        info!(%user, card = %card_id, %amount, balance = %card.balance, "card_recharged");
        Ok(RechargeReceipt {
            recharge_id: recharge.id,
            card_id: card_id.clone(),
            amount,
            new_balance: card.balance,
            payment_reference: reference,
        })
    }
}
