use super::audit::AuditRecorder;
use super::booking::{BookingService, RechargeReceipt, TicketDetails};
use super::commit::Committer;
use super::fare_calculator::FareCalculator;
use super::journey::JourneyStateMachine;
use super::ledger::LedgerService;
use super::validator::{GateResponse, MediaValidator};
use crate::domain::audit::AuditLogEntry;
use crate::domain::booking::PaymentMethod;
use crate::domain::card::SmartCard;
use crate::domain::ids::{CardId, JourneyId, StationId, UserId};
use crate::domain::journey::{Journey, MediaKind};
use crate::domain::money::Balance;
use crate::domain::ports::{
    ClockRef, FareScheduleRef, FareStoreRef, NotificationSinkRef, PaymentGatewayRef,
    StationDirectoryRef,
};
use crate::error::Result;
use crate::infrastructure::config::Config;
use rust_decimal::Decimal;
use std::sync::Arc;

/// External collaborators the engine is built from.
pub struct EnginePorts {
    pub store: FareStoreRef,
    pub stations: StationDirectoryRef,
    pub fares: FareScheduleRef,
    pub payments: PaymentGatewayRef,
    pub sink: NotificationSinkRef,
    pub clock: ClockRef,
}

/// The main entry point of the fare engine.
///
/// `FareEngine` wires every service over one shared store and exposes the
/// gate, passenger and operator operations. Each call is an independent unit
/// of work, so a single engine can be shared across tasks behind an `Arc`.
pub struct FareEngine {
    store: FareStoreRef,
    audit: Arc<AuditRecorder>,
    fares: Arc<FareCalculator>,
    ledger: Arc<LedgerService>,
    journeys: Arc<JourneyStateMachine>,
    validator: MediaValidator,
    booking: BookingService,
    clock: ClockRef,
    default_validity_hours: u32,
}

impl FareEngine {
    pub fn new(config: &Config, ports: EnginePorts) -> Result<Self> {
        config.validate()?;
        let EnginePorts {
            store,
            stations,
            fares,
            payments,
            sink,
            clock,
        } = ports;

        let audit = Arc::new(AuditRecorder::new(clock.clone()));
        let committer = Arc::new(Committer::new(store.clone(), sink));
        let fares = Arc::new(FareCalculator::new(fares));
        let ledger = Arc::new(LedgerService::new(
            store.clone(),
            audit.clone(),
            committer.clone(),
            clock.clone(),
            &config.ledger,
        )?);
        let journeys = Arc::new(JourneyStateMachine::new(
            store.clone(),
            stations.clone(),
            fares.clone(),
            ledger.clone(),
            audit.clone(),
            committer.clone(),
            clock.clone(),
        ));
        let validator = MediaValidator::new(store.clone(), journeys.clone());
        let booking = BookingService::new(
            stations,
            fares.clone(),
            ledger.clone(),
            payments,
            audit.clone(),
            committer,
            clock.clone(),
            config.booking.clone(),
            config.recharge.clone(),
        );

        Ok(Self {
            store,
            audit,
            fares,
            ledger,
            journeys,
            validator,
            booking,
            clock,
            default_validity_hours: config.booking.default_validity_hours,
        })
    }

    // Gate API

    pub async fn entry(&self, kind: MediaKind, media_id: &str, station: StationId) -> GateResponse {
        self.validator.entry(kind, media_id, station).await
    }

    pub async fn exit(&self, kind: MediaKind, media_id: &str, station: StationId) -> GateResponse {
        self.validator.exit(kind, media_id, station).await
    }

    // Passenger API

    /// Books a ticket; `validity_hours` falls back to the configured default.
    pub async fn book_ticket(
        &self,
        user: &UserId,
        source: StationId,
        destination: StationId,
        method: PaymentMethod,
        validity_hours: Option<u32>,
    ) -> Result<TicketDetails> {
        let hours = validity_hours.unwrap_or(self.default_validity_hours);
        self.booking
            .book_ticket(user, source, destination, method, hours)
            .await
    }

    pub async fn recharge_card(
        &self,
        user: &UserId,
        card_id: &CardId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<RechargeReceipt> {
        self.booking.recharge_card(user, card_id, amount, method).await
    }

    pub async fn card_balance(&self, card_id: &CardId) -> Result<Balance> {
        self.ledger.balance(card_id).await
    }

    /// Fare currently in force for the pair, zero when none is defined.
    pub async fn current_fare(&self, source: StationId, destination: StationId) -> Result<Balance> {
        self.fares
            .current_fare(source, destination, self.clock.now())
            .await
    }

    // Operator API

    pub async fn issue_card(&self, card_id: CardId, owner: Option<UserId>) -> Result<SmartCard> {
        self.ledger.issue_card(card_id, owner).await
    }

    pub async fn deactivate_card(&self, card_id: &CardId) -> Result<SmartCard> {
        self.ledger.deactivate_card(card_id).await
    }

    pub async fn cancel_journey(&self, journey_id: JourneyId, reason: &str) -> Result<Journey> {
        self.journeys.cancel(journey_id, reason).await
    }

    pub async fn active_journey(&self, kind: MediaKind, media_id: &str) -> Result<Journey> {
        self.validator.active_journey(kind, media_id).await
    }

    pub async fn journey(&self, journey_id: JourneyId) -> Result<Journey> {
        self.journeys.journey(journey_id).await
    }

    pub async fn cards(&self) -> Result<Vec<SmartCard>> {
        self.store.cards().await
    }

    pub async fn audit_trail(&self, entity_name: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        self.audit
            .history(self.store.as_ref(), entity_name, entity_id)
            .await
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn journeys(&self) -> &JourneyStateMachine {
        &self.journeys
    }
}
