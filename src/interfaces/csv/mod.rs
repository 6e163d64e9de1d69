pub mod command_reader;
pub mod fare_reader;
pub mod outcome_writer;
pub mod replay;
pub mod station_reader;

/// Every reader in this module trims whitespace and tolerates ragged rows.
fn reader_builder() -> ::csv::ReaderBuilder {
    let mut builder = ::csv::ReaderBuilder::new();
    builder.trim(::csv::Trim::All).flexible(true);
    builder
}
