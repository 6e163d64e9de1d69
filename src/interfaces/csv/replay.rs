use super::command_reader::{Command, CommandReader};
use super::outcome_writer::{Outcome, OutcomeWriter};
use crate::application::engine::FareEngine;
use crate::domain::journey::MediaKind;
use crate::error::Result;
use std::collections::HashMap;
use std::io::{Read, Write};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Drives a [`FareEngine`] from a command script.
///
/// Booked tickets are referred to by the alias given in the `book` row; the
/// runner keeps the alias to token mapping for the rest of the script. A
/// ticket id that is not a known alias is used as a raw token.
pub struct ScriptRunner<'a> {
    engine: &'a FareEngine,
    tickets: HashMap<String, String>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(engine: &'a FareEngine) -> Self {
        Self {
            engine,
            tickets: HashMap::new(),
        }
    }

    fn credential<'m>(&'m self, kind: MediaKind, media: &'m str) -> &'m str {
        match kind {
            MediaKind::Ticket => self.tickets.get(media).map_or(media, String::as_str),
            MediaKind::Card => media,
        }
    }

    pub async fn run(&mut self, line: u64, command: &Command) -> Outcome {
        let (op, subject) = (command.op(), command.subject());
        match self.execute(line, command).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::rejected(line, op, subject, &e),
        }
    }

    async fn execute(&mut self, line: u64, command: &Command) -> Result<Outcome> {
        let engine = self.engine;
        let mut outcome = Outcome::ok(line, command.op(), command.subject());
        match command {
            Command::Issue { card, owner } => {
                let card = engine.issue_card(card.clone(), owner.clone()).await?;
                outcome.balance = Some(card.balance.to_string());
            }
            Command::Deactivate { card } => {
                engine.deactivate_card(card).await?;
                outcome.detail = "deactivated".to_string();
            }
            Command::Recharge {
                user,
                card,
                amount,
                method,
            } => {
                let receipt = engine.recharge_card(user, card, *amount, *method).await?;
                outcome.balance = Some(receipt.new_balance.to_string());
                outcome.detail = receipt.payment_reference;
            }
            Command::Book {
                user,
                alias,
                source,
                destination,
                method,
                hours,
            } => {
                let ticket = engine
                    .book_ticket(user, *source, *destination, *method, *hours)
                    .await?;
                outcome.fare = Some(ticket.fare.to_string());
                outcome.detail = format!("valid until {}", ticket.valid_until.to_rfc3339());
                self.tickets.insert(alias.clone(), ticket.token);
            }
            Command::Entry { kind, media, station } => {
                let response = engine.entry(*kind, self.credential(*kind, media), *station).await;
                return Ok(Outcome::from_gate(line, command.op(), command.subject(), &response));
            }
            Command::Exit { kind, media, station } => {
                let response = engine.exit(*kind, self.credential(*kind, media), *station).await;
                return Ok(Outcome::from_gate(line, command.op(), command.subject(), &response));
            }
            Command::Cancel { kind, media } => {
                let journey = engine.active_journey(*kind, self.credential(*kind, media)).await?;
                engine.cancel_journey(journey.id, "cancelled by script").await?;
                outcome.journey = Some(journey.id.to_string());
                outcome.detail = "cancelled".to_string();
            }
            Command::Balance { card } => {
                outcome.balance = Some(engine.card_balance(card).await?.to_string());
            }
        }
        Ok(outcome)
    }
}

/// Replays `script` against `engine`, writing one outcome row per command.
///
/// Rejected commands are reported in the output and do not stop the replay;
/// only a failure to write the report stops it.
pub async fn replay<R: Read, W: Write>(engine: &FareEngine, script: R, out: W) -> Result<ReplaySummary> {
    let mut runner = ScriptRunner::new(engine);
    let mut writer = OutcomeWriter::new(out);
    let mut summary = ReplaySummary::default();

    for (index, parsed) in CommandReader::new(script).commands().enumerate() {
        // Line 1 is the header.
        let line = index as u64 + 2;
        let outcome = match parsed {
            Ok(command) => runner.run(line, &command).await,
            Err(e) => {
                warn!(line, error = %e, "unreadable_command");
                Outcome {
                    detail: e.to_string(),
                    ..Outcome::rejected(line, "unknown", String::new(), &e)
                }
            }
        };
        if outcome.is_ok() {
            summary.applied += 1;
        } else {
            summary.rejected += 1;
        }
        writer.write(&outcome)?;
    }
    writer.flush()?;

    info!(applied = summary.applied, rejected = summary.rejected, "replay_finished");
    Ok(summary)
}
