use super::journey::{ExitNotice, JourneyStateMachine, Settlement};
use crate::domain::ids::{CardId, JourneyId, StationId};
use crate::domain::journey::{Journey, JourneyMedia, MediaKind};
use crate::domain::money::Balance;
use crate::domain::ports::FareStoreRef;
use crate::error::{ErrorKind, FareError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FareError> for GateError {
    fn from(err: &FareError) -> Self {
        Self {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}

/// What a gate terminal gets back for a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResponse {
    pub success: bool,
    pub journey_id: Option<JourneyId>,
    pub fare_charged: Option<Balance>,
    pub new_balance: Option<Balance>,
    pub notice: Option<ExitNotice>,
    pub error: Option<GateError>,
}

impl GateResponse {
    fn opened(journey: &Journey) -> Self {
        Self {
            success: true,
            journey_id: Some(journey.id),
            fare_charged: None,
            new_balance: None,
            notice: None,
            error: None,
        }
    }

    fn settled(settlement: &Settlement) -> Self {
        Self {
            success: true,
            journey_id: Some(settlement.journey.id),
            fare_charged: Some(settlement.fare_charged),
            new_balance: settlement.new_balance,
            notice: settlement.notice,
            error: None,
        }
    }

    fn denied(err: &FareError) -> Self {
        Self {
            success: false,
            journey_id: None,
            fare_charged: None,
            new_balance: None,
            notice: None,
            error: Some(err.into()),
        }
    }
}

/// Gate-facing facade. Resolves a scanned credential to its media and hands
/// off to the journey state machine.
pub struct MediaValidator {
    store: FareStoreRef,
    journeys: Arc<JourneyStateMachine>,
}

impl MediaValidator {
    pub fn new(store: FareStoreRef, journeys: Arc<JourneyStateMachine>) -> Self {
        Self { store, journeys }
    }

    /// Tickets are scanned by token, cards by serial.
    async fn resolve_media(&self, kind: MediaKind, media_id: &str) -> Result<JourneyMedia> {
        match kind {
            MediaKind::Ticket => {
                let ticket = self
                    .store
                    .ticket_by_token(media_id)
                    .await?
                    .ok_or(FareError::TicketNotFound)?;
                Ok(JourneyMedia::Ticket(ticket.id))
            }
            MediaKind::Card => {
                let card_id = CardId::new(media_id);
                if self.store.card(&card_id).await?.is_none() {
                    return Err(FareError::CardNotFound(card_id.to_string()));
                }
                Ok(JourneyMedia::Card(card_id))
            }
        }
    }

    pub async fn try_entry(&self, kind: MediaKind, media_id: &str, station: StationId) -> Result<Journey> {
        let media = self.resolve_media(kind, media_id).await?;
        self.journeys.start(media, station).await
    }

    /// The journey currently open on the scanned media.
    pub async fn active_journey(&self, kind: MediaKind, media_id: &str) -> Result<Journey> {
        let media = self.resolve_media(kind, media_id).await?;
        self.store
            .active_journey(&media)
            .await?
            .ok_or(FareError::NoActiveJourney)
    }

    pub async fn try_exit(&self, kind: MediaKind, media_id: &str, station: StationId) -> Result<Settlement> {
        let journey = self.active_journey(kind, media_id).await?;
        self.journeys.complete(journey.id, station).await
    }

    pub async fn entry(&self, kind: MediaKind, media_id: &str, station: StationId) -> GateResponse {
        match self.try_entry(kind, media_id, station).await {
            Ok(journey) => GateResponse::opened(&journey),
            Err(e) => {
                warn!(media = ?kind, %station, reason = e.kind().as_str(), error = %e, "entry_denied");
                GateResponse::denied(&e)
            }
        }
    }

    pub async fn exit(&self, kind: MediaKind, media_id: &str, station: StationId) -> GateResponse {
        match self.try_exit(kind, media_id, station).await {
            Ok(settlement) => GateResponse::settled(&settlement),
            Err(e) => {
                warn!(media = ?kind, %station, reason = e.kind().as_str(), error = %e, "exit_denied");
                GateResponse::denied(&e)
            }
        }
    }
}
