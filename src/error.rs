use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FareError>;

/// Caller-visible failure classes reported by the gate and passenger APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InsufficientFunds,
    BalanceCeilingExceeded,
    FareShortfall,
    NoFareDefined,
    InvalidRoute,
    ValidationError,
    ConcurrencyConflict,
    PaymentDeclined,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::BalanceCeilingExceeded => "balance_ceiling_exceeded",
            ErrorKind::FareShortfall => "fare_shortfall",
            ErrorKind::NoFareDefined => "no_fare_defined",
            ErrorKind::InvalidRoute => "invalid_route",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::PaymentDeclined => "payment_declined",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum FareError {
    #[error("Station {0} not found")]
    StationNotFound(u32),
    #[error("Station {0} is not operational")]
    StationNotOperational(u32),
    #[error("Ticket not found")]
    TicketNotFound,
    #[error("Ticket is not valid for travel: {0}")]
    TicketInvalid(String),
    #[error("Card {0} not found")]
    CardNotFound(String),
    #[error("Card {0} is inactive")]
    CardInactive(String),
    #[error("Booking {0} not found")]
    BookingNotFound(String),
    #[error("Journey {0} not found")]
    JourneyNotFound(String),
    #[error("Journey {0} is not active")]
    JourneyNotActive(String),
    #[error("Media already has an active journey ({0})")]
    JourneyAlreadyActive(String),
    #[error("No active journey for this media")]
    NoActiveJourney,
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },
    #[error("Balance ceiling exceeded: resulting balance {attempted} is above {ceiling}")]
    BalanceCeilingExceeded { attempted: Decimal, ceiling: Decimal },
    #[error("Fare shortfall: route costs {required}, ticket paid {paid}")]
    FareShortfall { required: Decimal, paid: Decimal },
    #[error("No fare defined from station {source_station} to station {destination}")]
    NoFareDefined { source_station: u32, destination: u32 },
    #[error("Source and destination must differ (station {0})")]
    InvalidRoute(u32),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Concurrent modification detected: {0}")]
    ConcurrencyConflict(String),
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<toml::de::Error> for FareError {
    fn from(err: toml::de::Error) -> Self {
        FareError::ConfigError(err.to_string())
    }
}

impl FareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FareError::StationNotFound(_)
            | FareError::TicketNotFound
            | FareError::CardNotFound(_)
            | FareError::BookingNotFound(_)
            | FareError::JourneyNotFound(_) => ErrorKind::NotFound,
            FareError::StationNotOperational(_)
            | FareError::TicketInvalid(_)
            | FareError::CardInactive(_)
            | FareError::JourneyNotActive(_)
            | FareError::JourneyAlreadyActive(_)
            | FareError::NoActiveJourney => ErrorKind::InvalidState,
            FareError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            FareError::BalanceCeilingExceeded { .. } => ErrorKind::BalanceCeilingExceeded,
            FareError::FareShortfall { .. } => ErrorKind::FareShortfall,
            FareError::NoFareDefined { .. } => ErrorKind::NoFareDefined,
            FareError::InvalidRoute(_) => ErrorKind::InvalidRoute,
            FareError::ValidationError(_) => ErrorKind::ValidationError,
            FareError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            FareError::PaymentDeclined(_) => ErrorKind::PaymentDeclined,
            FareError::ConfigError(_)
            | FareError::CsvError(_)
            | FareError::IoError(_)
            | FareError::SerializationError(_)
            | FareError::InternalError(_) => ErrorKind::Internal,
            #[cfg(feature = "storage-rocksdb")]
            FareError::StorageError(_) => ErrorKind::Internal,
        }
    }

    /// Only lost races are worth retrying from the client side.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    /// Message safe to hand back to a gate or passenger; internal failures
    /// never leak storage details.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error, please retry later".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        FareError::InternalError(Box::new(std::io::Error::other(msg.into())))
    }
}
