use crate::application::validator::GateResponse;
use crate::error::{FareError, Result};
use serde::Serialize;
use std::io::Write;

/// One report row per replayed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub line: u64,
    pub op: String,
    pub subject: String,
    /// `ok`, or the error kind of a rejected command.
    pub status: String,
    pub journey: Option<String>,
    pub fare: Option<String>,
    pub balance: Option<String>,
    pub detail: String,
}

impl Outcome {
    pub fn ok(line: u64, op: &str, subject: String) -> Self {
        Self {
            line,
            op: op.to_string(),
            subject,
            status: "ok".to_string(),
            journey: None,
            fare: None,
            balance: None,
            detail: String::new(),
        }
    }

    pub fn rejected(line: u64, op: &str, subject: String, err: &FareError) -> Self {
        Self {
            status: err.kind().as_str().to_string(),
            detail: err.public_message(),
            ..Self::ok(line, op, subject)
        }
    }

    pub fn from_gate(line: u64, op: &str, subject: String, response: &GateResponse) -> Self {
        let mut outcome = Self::ok(line, op, subject);
        outcome.journey = response.journey_id.map(|id| id.to_string());
        outcome.fare = response.fare_charged.map(|f| f.to_string());
        outcome.balance = response.new_balance.map(|b| b.to_string());
        if let Some(notice) = &response.notice {
            outcome.detail = notice.to_string();
        }
        if let Some(error) = &response.error {
            outcome.status = error.kind.as_str().to_string();
            outcome.detail = error.message.clone();
        }
        outcome
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Writes outcome rows as CSV with a header line.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, outcome: &Outcome) -> Result<()> {
        self.writer.serialize(outcome)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(FareError::from)
    }
}
