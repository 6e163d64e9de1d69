//! Application layer orchestrating the fare engine's use cases.
//!
//! Services read through the domain ports, decide, and stage their writes
//! into a `ChangeSet` via the `AuditRecorder`. The `Committer` commits each
//! set atomically and publishes its events afterwards. `FareEngine` wires
//! them together.

pub mod audit;
pub mod booking;
pub mod commit;
pub mod engine;
pub mod fare_calculator;
pub mod journey;
pub mod ledger;
pub mod validator;
