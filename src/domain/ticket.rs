use super::ids::{BookingId, TicketId};
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

pub const TOKEN_LEN: usize = 32;

/// Generates an unguessable gate-scan token from the thread-local CSPRNG.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// A single-use QR ticket.
///
/// `is_used` flips exactly once, when a journey starts on this ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub booking_id: BookingId,
    pub token: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Ticket {
    pub fn issue(
        booking_id: BookingId,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Result<Self> {
        if valid_until <= valid_from {
            return Err(FareError::ValidationError(
                "Ticket validity window must end after it starts".to_string(),
            ));
        }
        Ok(Self {
            id: TicketId::new(),
            booking_id,
            token: generate_token(),
            valid_from,
            valid_until,
            is_used: false,
            used_at: None,
            version: 0,
        })
    }

    /// Checks the ticket can open an entry gate at `at`.
    pub fn check_usable(&self, at: DateTime<Utc>) -> Result<()> {
        if self.is_used {
            return Err(FareError::TicketInvalid("ticket already used".to_string()));
        }
        if at < self.valid_from {
            return Err(FareError::TicketInvalid("ticket not yet valid".to_string()));
        }
        if at > self.valid_until {
            return Err(FareError::TicketInvalid("ticket expired".to_string()));
        }
        Ok(())
    }

    pub fn mark_used(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.check_usable(at)?;
        self.is_used = true;
        self.used_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket::issue(BookingId::new(), now, now + Duration::hours(2)).unwrap()
    }

    #[test]
    fn test_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_validity_window_must_be_ordered() {
        let now = Utc::now();
        assert!(Ticket::issue(BookingId::new(), now, now).is_err());
    }

    #[test]
    fn test_mark_used_once() {
        let mut t = ticket();
        let at = t.valid_from + Duration::minutes(5);
        t.mark_used(at).unwrap();
        assert!(t.is_used);
        assert_eq!(t.used_at, Some(at));
        assert!(matches!(t.mark_used(at), Err(FareError::TicketInvalid(_))));
    }

    #[test]
    fn test_expired_ticket() {
        let t = ticket();
        let late = t.valid_until + Duration::seconds(1);
        assert!(matches!(t.check_usable(late), Err(FareError::TicketInvalid(_))));
        assert!(t.check_usable(t.valid_until).is_ok());
    }
}
