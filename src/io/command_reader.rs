//! Asynchronous CSV reader for ledger command files
//!
//! Provides a batch reading interface over the rows of a command file.
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → CommandReader → Batches of LedgerCommands
//!                  ↓
//!           command_format module
//!           (CsvCommand, convert_csv_command)
//! ```
//!
//! Malformed rows are logged and skipped; they never abort the batch.

use crate::io::command_format::{convert_csv_command, CsvCommand, LedgerCommand};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous command file reader
///
/// Keeps memory use bounded by the batch size regardless of file length.
pub struct CommandReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    skipped: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> CommandReader<R> {
    /// Create a new CommandReader from an async reader
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            skipped: 0,
        }
    }

    /// Read a batch of commands
    ///
    /// Reads up to `batch_size` valid commands, in file order.
    ///
    /// # Returns
    ///
    /// The converted commands. An empty vector means the end of the file was
    /// reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<LedgerCommand> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut rows = self.csv_reader.deserialize::<CsvCommand>();

        while batch.len() < batch_size {
            match rows.next().await {
                Some(Ok(row)) => match convert_csv_command(row) {
                    Ok(command) => batch.push(command),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed command");
                        self.skipped += 1;
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, "skipping unreadable csv row");
                    self.skipped += 1;
                }
                None => break,
            }
        }

        batch
    }

    /// Number of rows skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
