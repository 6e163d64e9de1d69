//! Outer adapters. The CLI drives the engine through CSV files.

pub mod csv;
