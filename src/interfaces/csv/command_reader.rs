use crate::domain::booking::PaymentMethod;
use crate::domain::ids::{CardId, StationId, UserId};
use crate::domain::journey::MediaKind;
use crate::error::{FareError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a replay script.
///
/// Columns: `op, user, media, id, station, destination, amount, method, hours`.
/// Which columns are required depends on `op`; unused ones may be empty.
#[derive(Debug, Deserialize)]
pub struct CommandRecord {
    pub op: String,
    pub user: Option<String>,
    pub media: Option<String>,
    pub id: Option<String>,
    pub station: Option<u32>,
    pub destination: Option<u32>,
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Issue {
        card: CardId,
        owner: Option<UserId>,
    },
    Deactivate {
        card: CardId,
    },
    Recharge {
        user: UserId,
        card: CardId,
        amount: Decimal,
        method: PaymentMethod,
    },
    /// `alias` names the booked ticket for later rows of the same script.
    Book {
        user: UserId,
        alias: String,
        source: StationId,
        destination: StationId,
        method: PaymentMethod,
        hours: Option<u32>,
    },
    Entry {
        kind: MediaKind,
        media: String,
        station: StationId,
    },
    Exit {
        kind: MediaKind,
        media: String,
        station: StationId,
    },
    Cancel {
        kind: MediaKind,
        media: String,
    },
    Balance {
        card: CardId,
    },
}

impl Command {
    pub fn op(&self) -> &'static str {
        match self {
            Command::Issue { .. } => "issue",
            Command::Deactivate { .. } => "deactivate",
            Command::Recharge { .. } => "recharge",
            Command::Book { .. } => "book",
            Command::Entry { .. } => "entry",
            Command::Exit { .. } => "exit",
            Command::Cancel { .. } => "cancel",
            Command::Balance { .. } => "balance",
        }
    }

    /// Card serial, ticket alias or token the command acts on.
    pub fn subject(&self) -> String {
        match self {
            Command::Issue { card, .. }
            | Command::Deactivate { card }
            | Command::Recharge { card, .. }
            | Command::Balance { card } => card.to_string(),
            Command::Book { alias, .. } => alias.clone(),
            Command::Entry { media, .. } | Command::Exit { media, .. } | Command::Cancel { media, .. } => {
                media.clone()
            }
        }
    }
}

fn required<T>(value: Option<T>, op: &str, column: &str) -> Result<T> {
    value.ok_or_else(|| FareError::ValidationError(format!("'{op}' requires column '{column}'")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<CommandRecord> for Command {
    type Error = FareError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let op = record.op.to_ascii_lowercase();
        let id = non_empty(record.id);
        let user = non_empty(record.user);
        let kind = non_empty(record.media)
            .map(|m| m.parse::<MediaKind>().map_err(FareError::ValidationError))
            .transpose()?;
        let method = non_empty(record.method)
            .map(|m| m.parse::<PaymentMethod>().map_err(FareError::ValidationError))
            .transpose()?;

        let command = match op.as_str() {
            "issue" => Command::Issue {
                card: CardId::new(required(id, &op, "id")?),
                owner: user.map(UserId::new),
            },
            "deactivate" => Command::Deactivate {
                card: CardId::new(required(id, &op, "id")?),
            },
            "recharge" => Command::Recharge {
                user: UserId::new(required(user, &op, "user")?),
                card: CardId::new(required(id, &op, "id")?),
                amount: required(record.amount, &op, "amount")?,
                method: required(method, &op, "method")?,
            },
            "book" => Command::Book {
                user: UserId::new(required(user, &op, "user")?),
                alias: required(id, &op, "id")?,
                source: StationId(required(record.station, &op, "station")?),
                destination: StationId(required(record.destination, &op, "destination")?),
                method: required(method, &op, "method")?,
                hours: record.hours,
            },
            "entry" => Command::Entry {
                kind: required(kind, &op, "media")?,
                media: required(id, &op, "id")?,
                station: StationId(required(record.station, &op, "station")?),
            },
            "exit" => Command::Exit {
                kind: required(kind, &op, "media")?,
                media: required(id, &op, "id")?,
                station: StationId(required(record.station, &op, "station")?),
            },
            "cancel" => Command::Cancel {
                kind: required(kind, &op, "media")?,
                media: required(id, &op, "id")?,
            },
            "balance" => Command::Balance {
                card: CardId::new(required(id, &op, "id")?),
            },
            other => {
                return Err(FareError::ValidationError(format!("unknown command '{other}'")));
            }
        };
        Ok(command)
    }
}

/// Streams commands from a replay script.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(FareError::from).and_then(Command::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "op, user, media, id, station, destination, amount, method, hours\n";

    fn parse(rows: &str) -> Vec<Result<Command>> {
        let data = format!("{HEADER}{rows}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_parses_every_command() {
        let results = parse(
            "issue, alice, card, C-1, , , , ,\n\
             recharge, alice, card, C-1, , , 100, upi,\n\
             book, bob, ticket, T1, 1, 2, , wallet, 12\n\
             entry, , ticket, T1, 1, , , ,\n\
             exit, , card, C-1, 2, , , ,\n\
             cancel, , card, C-1, , , , ,\n\
             deactivate, , , C-1, , , , ,\n\
             balance, , , C-1, , , , ,",
        );
        let commands: Vec<Command> = results.into_iter().collect::<Result<_>>().unwrap();
        assert_eq!(commands.len(), 8);

        assert_eq!(
            commands[1],
            Command::Recharge {
                user: UserId::new("alice"),
                card: CardId::new("C-1"),
                amount: dec!(100),
                method: PaymentMethod::Upi,
            }
        );
        assert_eq!(
            commands[2],
            Command::Book {
                user: UserId::new("bob"),
                alias: "T1".to_string(),
                source: StationId(1),
                destination: StationId(2),
                method: PaymentMethod::Wallet,
                hours: Some(12),
            }
        );
        assert_eq!(commands[3].op(), "entry");
        assert_eq!(commands[3].subject(), "T1");
    }

    #[test]
    fn test_missing_column_and_unknown_op() {
        let results = parse("entry, , card, C-1, , , , ,\nteleport, , , , , , , ,");
        assert!(matches!(&results[0], Err(FareError::ValidationError(m)) if m.contains("station")));
        assert!(matches!(&results[1], Err(FareError::ValidationError(m)) if m.contains("teleport")));
    }

    #[test]
    fn test_bad_payment_method() {
        let results = parse("recharge, alice, card, C-1, , , 100, cheque,");
        assert!(results[0].is_err());
    }
}
