use crate::domain::fare::select_effective;
use crate::domain::ids::StationId;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::FareScheduleRef;
use crate::error::{FareError, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Resolves route fares from the fare schedule. Read-only.
pub struct FareCalculator {
    schedule: FareScheduleRef,
}

impl FareCalculator {
    pub fn new(schedule: FareScheduleRef) -> Self {
        Self { schedule }
    }

    /// Fare in force for the ordered pair at `as_of`, or `Balance::ZERO` when
    /// no row applies. Zero means "no fare", never "free ride".
    pub async fn current_fare(
        &self,
        source: StationId,
        destination: StationId,
        as_of: DateTime<Utc>,
    ) -> Result<Balance> {
        let rows = self.schedule.fares_between(source, destination).await?;
        let fare = select_effective(&rows, as_of).map_or(Balance::ZERO, |row| row.amount);
        debug!(%source, %destination, %fare, candidates = rows.len(), "fare_resolved");
        Ok(fare)
    }

    /// Like [`FareCalculator::current_fare`] but fails with `NoFareDefined`
    /// instead of returning zero.
    pub async fn required_fare(
        &self,
        source: StationId,
        destination: StationId,
        as_of: DateTime<Utc>,
    ) -> Result<Amount> {
        self.current_fare(source, destination, as_of)
            .await?
            .as_amount()
            .ok_or(FareError::NoFareDefined {
                source_station: source.0,
                destination: destination.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fare::Fare;
    use crate::infrastructure::in_memory::InMemoryFareSchedule;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn row(amount: rust_decimal::Decimal, from: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Fare {
        Fare {
            source: StationId(1),
            destination: StationId(2),
            amount: Balance::new(amount).unwrap(),
            effective_from: from,
            effective_until: until,
        }
    }

    #[tokio::test]
    async fn test_superseding_row_applies_from_its_start() {
        let now = Utc::now();
        let schedule = InMemoryFareSchedule::with_fares([
            row(dec!(25), now - Duration::days(30), None),
            row(dec!(30), now + Duration::days(1), None),
        ]);
        let calculator = FareCalculator::new(Arc::new(schedule));

        let today = calculator.current_fare(StationId(1), StationId(2), now).await.unwrap();
        assert_eq!(today.value(), dec!(25));

        let tomorrow = calculator
            .current_fare(StationId(1), StationId(2), now + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(tomorrow.value(), dec!(30));
    }

    #[tokio::test]
    async fn test_missing_fare_is_zero_and_required_fails() {
        let calculator = FareCalculator::new(Arc::new(InMemoryFareSchedule::new()));
        let now = Utc::now();

        let fare = calculator.current_fare(StationId(1), StationId(2), now).await.unwrap();
        assert!(fare.is_zero());

        let result = calculator.required_fare(StationId(1), StationId(2), now).await;
        assert!(matches!(result, Err(FareError::NoFareDefined { .. })));
    }

    #[tokio::test]
    async fn test_direction_matters() {
        let now = Utc::now();
        let schedule = InMemoryFareSchedule::with_fares([row(dec!(30), now - Duration::days(1), None)]);
        let calculator = FareCalculator::new(Arc::new(schedule));
        let reverse = calculator.current_fare(StationId(2), StationId(1), now).await.unwrap();
        assert!(reverse.is_zero());
    }
}
