use super::audit::AuditRecorder;
use super::commit::Committer;
use super::fare_calculator::FareCalculator;
use super::ledger::LedgerService;
use crate::domain::event::{DomainEvent, EventName};
use crate::domain::ids::{CardId, JourneyId, StationId, TicketId};
use crate::domain::journey::{Journey, JourneyMedia};
use crate::domain::money::Balance;
use crate::domain::ports::{ClockRef, FareStoreRef, StationDirectoryRef};
use crate::domain::station::Station;
use crate::domain::ticket::Ticket;
use crate::domain::unit_of_work::ChangeSet;
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Non-fatal remark attached to a successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum ExitNotice {
    /// Ticket holder left somewhere other than the booked destination, at a
    /// fare the ticket still covers.
    WrongDestination { booked: StationId, actual: StationId },
}

impl fmt::Display for ExitNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitNotice::WrongDestination { booked, actual } => {
                write!(f, "exited at station {actual}, ticket was booked to station {booked}")
            }
        }
    }
}

/// Outcome of a completed journey.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub journey: Journey,
    pub fare_charged: Balance,
    /// Card balance after the debit. `None` for ticket journeys.
    pub new_balance: Option<Balance>,
    pub notice: Option<ExitNotice>,
}

/// Owns journey status transitions and the ticket `is_used` flag.
pub struct JourneyStateMachine {
    store: FareStoreRef,
    stations: StationDirectoryRef,
    fares: Arc<FareCalculator>,
    ledger: Arc<LedgerService>,
    audit: Arc<AuditRecorder>,
    committer: Arc<Committer>,
    clock: ClockRef,
}

fn gate_actor(station: StationId) -> Option<String> {
    Some(format!("gate:{station}"))
}

impl JourneyStateMachine {
    pub fn new(
        store: FareStoreRef,
        stations: StationDirectoryRef,
        fares: Arc<FareCalculator>,
        ledger: Arc<LedgerService>,
        audit: Arc<AuditRecorder>,
        committer: Arc<Committer>,
        clock: ClockRef,
    ) -> Self {
        Self {
            store,
            stations,
            fares,
            ledger,
            audit,
            committer,
            clock,
        }
    }

    async fn operational_station(&self, id: StationId) -> Result<Station> {
        let station = self
            .stations
            .station(id)
            .await?
            .ok_or(FareError::StationNotFound(id.0))?;
        if !station.operational {
            return Err(FareError::StationNotOperational(id.0));
        }
        Ok(station)
    }

    async fn ensure_no_active_journey(&self, media: &JourneyMedia) -> Result<()> {
        match self.store.active_journey(media).await? {
            Some(active) => Err(FareError::JourneyAlreadyActive(active.id.to_string())),
            None => Ok(()),
        }
    }

    async fn load_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.store.ticket(id).await?.ok_or(FareError::TicketNotFound)
    }

    pub async fn journey(&self, id: JourneyId) -> Result<Journey> {
        self.store
            .journey(id)
            .await?
            .ok_or_else(|| FareError::JourneyNotFound(id.to_string()))
    }

    /// Opens a journey at an entry gate.
    pub async fn start(&self, media: JourneyMedia, entry_station: StationId) -> Result<Journey> {
        self.operational_station(entry_station).await?;
        let now = self.clock.now();
        let mut changes = ChangeSet::new(gate_actor(entry_station));

        match &media {
            JourneyMedia::Ticket(ticket_id) => {
                let ticket = self.load_ticket(*ticket_id).await?;
                ticket.check_usable(now)?;
                self.ensure_no_active_journey(&media).await?;

                let mut used = ticket.clone();
                used.mark_used(now)?;
                self.audit.stage_update(&mut changes, &ticket, used)?;
            }
            JourneyMedia::Card(card_id) => {
                let card = self
                    .store
                    .card(card_id)
                    .await?
                    .ok_or_else(|| FareError::CardNotFound(card_id.to_string()))?;
                if !card.active {
                    return Err(FareError::CardInactive(card_id.to_string()));
                }
                self.ledger.check_entry_floor(&card)?;
                self.ensure_no_active_journey(&media).await?;
            }
        }

        let journey = Journey::start(media, entry_station, now);
        self.audit.stage_insert(&mut changes, journey.clone())?;
        changes.emit(DomainEvent::new(
            EventName::JourneyEntry,
            now,
            json!({
                "journey_id": journey.id,
                "media": journey.media,
                "station_id": entry_station,
            }),
        ));
        self.committer.commit(changes).await?;

        info!(journey = %journey.id, media = %journey.media, station = %entry_station, "journey_started");
        Ok(journey)
    }

    /// Settles and closes an active journey at an exit gate.
    ///
    /// Any failure leaves the journey Active and nothing written.
    pub async fn complete(&self, journey_id: JourneyId, exit_station: StationId) -> Result<Settlement> {
        let journey = self.journey(journey_id).await?;
        journey.ensure_active()?;
        self.operational_station(exit_station).await?;

        let now = self.clock.now();
        let mut changes = ChangeSet::new(gate_actor(exit_station));

        let (fare_charged, new_balance, notice) = match &journey.media {
            JourneyMedia::Ticket(ticket_id) => {
                let (fare, notice) = self.settle_ticket(&journey, *ticket_id, exit_station, now).await?;
                (fare, None, notice)
            }
            JourneyMedia::Card(card_id) => {
                let (fare, balance) = self
                    .settle_card(&mut changes, &journey, card_id, exit_station, now)
                    .await?;
                (fare, Some(balance), None)
            }
        };

        let mut completed = journey.clone();
        completed.complete(exit_station, now, fare_charged)?;
        let completed = self.audit.stage_update(&mut changes, &journey, completed)?;
        changes.emit(DomainEvent::new(
            EventName::JourneyExit,
            now,
            json!({
                "journey_id": completed.id,
                "media": completed.media,
                "entry_station_id": completed.entry_station,
                "exit_station_id": exit_station,
                "fare": fare_charged,
                "new_balance": new_balance,
            }),
        ));
        self.committer.commit(changes).await?;

        info!(
            journey = %completed.id,
            media = %completed.media,
            station = %exit_station,
            fare = %fare_charged,
            "journey_completed"
        );
        Ok(Settlement {
            journey: completed,
            fare_charged,
            new_balance,
            notice,
        })
    }

    /// Ticket fares were paid at booking; the exit only checks the route
    /// actually travelled is covered.
    async fn settle_ticket(
        &self,
        journey: &Journey,
        ticket_id: TicketId,
        exit_station: StationId,
        now: DateTime<Utc>,
    ) -> Result<(Balance, Option<ExitNotice>)> {
        let ticket = self.load_ticket(ticket_id).await?;
        let booking = self
            .store
            .booking(ticket.booking_id)
            .await?
            .ok_or_else(|| FareError::BookingNotFound(ticket.booking_id.to_string()))?;
        let paid = Balance::from(booking.total_fare);

        let actual = self
            .fares
            .current_fare(journey.entry_station, exit_station, now)
            .await?;
        if actual.is_zero()
            && exit_station != journey.entry_station
            && exit_station != booking.destination
        {
            return Err(FareError::NoFareDefined {
                source_station: journey.entry_station.0,
                destination: exit_station.0,
            });
        }
        if actual > paid {
            return Err(FareError::FareShortfall {
                required: actual.value(),
                paid: paid.value(),
            });
        }

        let notice = (exit_station != booking.destination).then_some(ExitNotice::WrongDestination {
            booked: booking.destination,
            actual: exit_station,
        });
        Ok((paid, notice))
    }

    async fn settle_card(
        &self,
        changes: &mut ChangeSet,
        journey: &Journey,
        card_id: &CardId,
        exit_station: StationId,
        now: DateTime<Utc>,
    ) -> Result<(Balance, Balance)> {
        let fare = self
            .fares
            .current_fare(journey.entry_station, exit_station, now)
            .await?;
        match fare.as_amount() {
            Some(amount) => {
                let card = self.ledger.stage_debit(changes, card_id, amount, now).await?;
                Ok((fare, card.balance))
            }
            None if exit_station == journey.entry_station => {
                Ok((Balance::ZERO, self.ledger.balance(card_id).await?))
            }
            None => Err(FareError::NoFareDefined {
                source_station: journey.entry_station.0,
                destination: exit_station.0,
            }),
        }
    }

    /// Operator cancellation. No fare is charged and a used ticket stays used.
    pub async fn cancel(&self, journey_id: JourneyId, reason: &str) -> Result<Journey> {
        let journey = self.journey(journey_id).await?;
        let mut cancelled = journey.clone();
        cancelled.cancel()?;

        let now = self.clock.now();
        let mut changes = ChangeSet::new(Some("operator".to_string()));
        let cancelled = self.audit.stage_update(&mut changes, &journey, cancelled)?;
        changes.emit(DomainEvent::new(
            EventName::JourneyCancelled,
            now,
            json!({
                "journey_id": cancelled.id,
                "media": cancelled.media,
                "reason": reason,
            }),
        ));
        self.committer.commit(changes).await?;

        info!(journey = %journey_id, reason, "journey_cancelled");
        Ok(cancelled)
    }
}
