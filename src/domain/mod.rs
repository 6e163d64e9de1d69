//! Domain model: entities, value objects and the ports the core depends on.

pub mod audit;
pub mod booking;
pub mod card;
pub mod event;
pub mod fare;
pub mod ids;
pub mod journey;
pub mod money;
pub mod ports;
pub mod station;
pub mod ticket;
pub mod unit_of_work;
