#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fare_engine::application::engine::{EnginePorts, FareEngine};
use fare_engine::domain::booking::PaymentMethod;
use fare_engine::domain::event::DomainEvent;
use fare_engine::domain::fare::Fare;
use fare_engine::domain::ids::{CardId, StationId, UserId};
use fare_engine::domain::money::{Amount, Balance};
use fare_engine::domain::ports::{FareStore, NotificationSinkRef, PaymentGatewayRef};
use fare_engine::domain::station::Station;
use fare_engine::domain::ticket::Ticket;
use fare_engine::infrastructure::clock::ManualClock;
use fare_engine::infrastructure::config::Config;
use fare_engine::infrastructure::in_memory::{
    InMemoryFareSchedule, InMemoryFareStore, InMemoryStationDirectory,
};
use fare_engine::infrastructure::notification::ChannelSink;
use fare_engine::infrastructure::payment::MockPaymentGateway;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub const S1: StationId = StationId(1);
pub const S2: StationId = StationId(2);
pub const S3: StationId = StationId(3);
/// Exists but is closed.
pub const S4: StationId = StationId(4);

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn stations() -> Vec<Station> {
    [(1, "CEN", "Central", true), (2, "HBR", "Harbour", true), (3, "AIR", "Airport", true), (4, "DEP", "Depot", false)]
        .into_iter()
        .map(|(id, code, name, operational)| Station {
            id: StationId(id),
            code: code.to_string(),
            name: name.to_string(),
            operational,
        })
        .collect()
}

pub fn fare(source: StationId, destination: StationId, amount: Decimal) -> Fare {
    Fare {
        source,
        destination,
        amount: Balance::new(amount).unwrap(),
        effective_from: t0() - Duration::days(30),
        effective_until: None,
    }
}

/// S1 <-> S2 costs 30, S1 <-> S3 costs 50, S2 -> S3 costs 20.
pub fn fares() -> Vec<Fare> {
    vec![
        fare(S1, S2, Decimal::from(30)),
        fare(S2, S1, Decimal::from(30)),
        fare(S1, S3, Decimal::from(50)),
        fare(S3, S1, Decimal::from(50)),
        fare(S2, S3, Decimal::from(20)),
    ]
}

pub struct Harness {
    pub engine: Arc<FareEngine>,
    pub clock: ManualClock,
    pub store: Arc<InMemoryFareStore>,
    pub stations: InMemoryStationDirectory,
    pub fares: InMemoryFareSchedule,
    pub events: UnboundedReceiver<DomainEvent>,
}

impl Harness {
    /// Moves the clock forward so the next gate call happens later.
    pub fn tick(&self) {
        self.clock.advance(Duration::minutes(5));
    }

    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn card_with_balance(&self, serial: &str, balance: Decimal) -> CardId {
        let id = CardId::new(serial);
        self.engine
            .issue_card(id.clone(), Some(UserId::new("rider")))
            .await
            .unwrap();
        if let Ok(amount) = Amount::new(balance) {
            self.engine.ledger().credit(&id, amount).await.unwrap();
        }
        id
    }

    pub async fn ticket(&self, token: &str) -> Ticket {
        self.store.ticket_by_token(token).await.unwrap().unwrap()
    }

    pub async fn audit_len(&self) -> usize {
        self.store.audit_log().await.unwrap().len()
    }

    pub async fn book(&self, source: StationId, destination: StationId) -> String {
        self.engine
            .book_ticket(&UserId::new("rider"), source, destination, PaymentMethod::Upi, Some(2))
            .await
            .unwrap()
            .token
    }
}

pub fn harness() -> Harness {
    harness_with(Config::default(), Arc::new(MockPaymentGateway::new()), None)
}

/// Builds an engine over in-memory adapters. `sink` replaces the channel sink
/// when given; `events` then never receives anything.
pub fn harness_with(
    config: Config,
    payments: PaymentGatewayRef,
    sink: Option<NotificationSinkRef>,
) -> Harness {
    let clock = ManualClock::new(t0());
    let store = Arc::new(InMemoryFareStore::new());
    let stations = InMemoryStationDirectory::with_stations(stations());
    let fares = InMemoryFareSchedule::with_fares(fares());
    let (channel, events) = ChannelSink::new();

    let engine = FareEngine::new(
        &config,
        EnginePorts {
            store: store.clone(),
            stations: Arc::new(stations.clone()),
            fares: Arc::new(fares.clone()),
            payments,
            sink: sink.unwrap_or_else(|| Arc::new(channel)),
            clock: Arc::new(clock.clone()),
        },
    )
    .unwrap();

    Harness {
        engine: Arc::new(engine),
        clock,
        store,
        stations,
        fares,
        events,
    }
}

pub fn write_stations_csv(path: &Path) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["id", "code", "name", "operational"])?;
    for station in stations() {
        wtr.write_record([
            station.id.to_string(),
            station.code,
            station.name,
            station.operational.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_fares_csv(path: &Path) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["source", "destination", "amount", "effective_from", "effective_until"])?;
    for fare in fares() {
        wtr.write_record([
            fare.source.to_string(),
            fare.destination.to_string(),
            fare.amount.to_string(),
            // Far enough back that the wall clock is always past it.
            "2020-01-01T00:00:00Z".to_string(),
            String::new(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
