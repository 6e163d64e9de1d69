use crate::domain::ports::{FareStoreRef, NotificationSinkRef};
use crate::domain::unit_of_work::ChangeSet;
use crate::error::Result;
use tracing::{debug, warn};

/// Commits a unit of work and then publishes its events.
///
/// Events leave only after the store accepted the change set. A sink failure
/// is logged and swallowed: the mutation already happened.
pub struct Committer {
    store: FareStoreRef,
    sink: NotificationSinkRef,
}

impl Committer {
    pub fn new(store: FareStoreRef, sink: NotificationSinkRef) -> Self {
        Self { store, sink }
    }

    pub async fn commit(&self, mut changes: ChangeSet) -> Result<()> {
        let events = changes.take_events();
        let writes = changes.writes().len();
        self.store.commit(changes).await?;
        debug!(writes, events = events.len(), "unit_of_work_committed");

        for event in &events {
            if let Err(e) = self.sink.publish(event).await {
                warn!(event = %event.name, error = %e, "event_delivery_failed");
            }
        }
        Ok(())
    }
}
