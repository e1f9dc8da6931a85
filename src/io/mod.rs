//! I/O module
//!
//! Handles command file parsing and report output.
//!
//! # Components
//!
//! - `command_format` - CSV format handling (command conversion, report serialization)
//! - `command_reader` - Asynchronous command reader with batch reading interface

pub mod command_format;
pub mod command_reader;

pub use command_format::{
    convert_csv_command, write_accounts_csv, write_payments_csv, CsvCommand, LedgerCommand,
};
pub use command_reader::CommandReader;
