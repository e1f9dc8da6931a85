//! CSV format handling for ledger commands and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvCommand structure for deserialization
//! - Conversion from CSV rows to ledger commands
//! - Account and payment report serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::service::{AccountView, PaymentView};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV row structure for deserialization
///
/// Matches the input CSV format with columns: op, name, to, amount.
/// `to` is only used by transfers and `amount` only by deposits and
/// transfers, so both may be empty.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvCommand {
    pub op: String,
    pub name: String,
    pub to: Option<String>,
    pub amount: Option<String>,
}

/// A ledger operation read from the command file
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    Register { name: String },
    Deposit { name: String, amount: Decimal },
    Transfer { from: String, to: String, amount: Decimal },
    Delete { name: String },
}

impl LedgerCommand {
    /// Operation name, as written in the command file
    pub fn op(&self) -> &'static str {
        match self {
            LedgerCommand::Register { .. } => "register",
            LedgerCommand::Deposit { .. } => "deposit",
            LedgerCommand::Transfer { .. } => "transfer",
            LedgerCommand::Delete { .. } => "delete",
        }
    }
}

/// Convert a CsvCommand to a LedgerCommand
///
/// This function:
/// - Parses the operation string (case-insensitive)
/// - Parses the amount string into a Decimal where one is required
/// - Requires a payee for transfers
///
/// Amount signs and account names are not checked here; the ledger reports
/// those as domain errors.
///
/// # Arguments
///
/// * `row` - The deserialized CSV row
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted command
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_command(row: CsvCommand) -> Result<LedgerCommand, String> {
    let op = row.op.to_lowercase();

    let parse_amount = |row: &CsvCommand| -> Result<Decimal, String> {
        match row.amount.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Decimal::from_str(raw)
                .map_err(|_| format!("Invalid amount '{}' for {} of '{}'", raw, op, row.name)),
            _ => Err(format!("{} of '{}' requires an amount", op, row.name)),
        }
    };

    match op.as_str() {
        "register" => Ok(LedgerCommand::Register { name: row.name }),
        "delete" => Ok(LedgerCommand::Delete { name: row.name }),
        "deposit" => {
            let amount = parse_amount(&row)?;
            Ok(LedgerCommand::Deposit {
                name: row.name,
                amount,
            })
        }
        "transfer" => {
            let amount = parse_amount(&row)?;
            let to = row
                .to
                .filter(|to| !to.trim().is_empty())
                .ok_or_else(|| format!("transfer from '{}' requires a payee", row.name))?;
            Ok(LedgerCommand::Transfer {
                from: row.name,
                to,
                amount,
            })
        }
        _ => Err(format!("Invalid operation: '{}' for '{}'", row.op, row.name)),
    }
}

/// Write account views to CSV format
///
/// Writes accounts in CSV format with columns: name, balance, currency.
/// Rows keep the order given (registration order from the ledger).
///
/// # Arguments
///
/// * `accounts` - Slice of accounts to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[AccountView], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["name", "balance", "currency"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for account in accounts {
        writer
            .write_record([
                account.name.clone(),
                format!("{:.4}", account.balance),
                account.currency.clone(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

/// Write payment views to CSV format
///
/// Writes payments in CSV format with columns: id, account, to_account,
/// amount, direction. Commit dates are left out so reports of the same
/// command file are reproducible.
pub fn write_payments_csv(payments: &[PaymentView], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["id", "account", "to_account", "amount", "direction"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for payment in payments {
        writer
            .write_record([
                payment.id.to_string(),
                payment.account.clone(),
                payment.to_account.clone(),
                format!("{:.4}", payment.amount),
                payment.direction.to_string(),
            ])
            .map_err(|e| format!("Failed to write payment record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use chrono::Utc;
    use rstest::rstest;

    fn row(op: &str, name: &str, to: Option<&str>, amount: Option<&str>) -> CsvCommand {
        CsvCommand {
            op: op.to_string(),
            name: name.to_string(),
            to: to.map(str::to_string),
            amount: amount.map(str::to_string),
        }
    }

    #[rstest]
    #[case::register(row("register", "alice", None, None), LedgerCommand::Register { name: "alice".into() })]
    #[case::delete(row("DELETE", "alice", None, None), LedgerCommand::Delete { name: "alice".into() })]
    #[case::deposit(
        row("deposit", "alice", None, Some(" 10.5 ")),
        LedgerCommand::Deposit { name: "alice".into(), amount: Decimal::new(105, 1) }
    )]
    #[case::negative_deposit_passes_through(
        row("deposit", "alice", None, Some("-1")),
        LedgerCommand::Deposit { name: "alice".into(), amount: Decimal::new(-1, 0) }
    )]
    #[case::transfer(
        row("Transfer", "alice", Some("bobby"), Some("4")),
        LedgerCommand::Transfer { from: "alice".into(), to: "bobby".into(), amount: Decimal::new(4, 0) }
    )]
    fn test_convert_csv_command_valid(#[case] input: CsvCommand, #[case] expected: LedgerCommand) {
        assert_eq!(convert_csv_command(input), Ok(expected));
    }

    #[rstest]
    #[case::invalid_op(row("withdraw", "alice", None, Some("1")), "Invalid operation")]
    #[case::deposit_missing_amount(row("deposit", "alice", None, None), "requires an amount")]
    #[case::deposit_blank_amount(row("deposit", "alice", None, Some("  ")), "requires an amount")]
    #[case::invalid_amount(row("deposit", "alice", None, Some("ten")), "Invalid amount")]
    #[case::transfer_missing_payee(row("transfer", "alice", None, Some("1")), "requires a payee")]
    #[case::transfer_blank_payee(row("transfer", "alice", Some(""), Some("1")), "requires a payee")]
    fn test_convert_csv_command_errors(#[case] input: CsvCommand, #[case] expected_error: &str) {
        let result = convert_csv_command(input);
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[rstest]
    #[case::empty(vec![], "name,balance,currency\n")]
    #[case::four_decimal_precision(
        vec![
            AccountView { name: "alice".into(), balance: Decimal::new(1001234, 4), currency: "usd".into() },
            AccountView { name: "bobby".into(), balance: Decimal::ZERO, currency: "usd".into() },
        ],
        "name,balance,currency\nalice,100.1234,usd\nbobby,0.0000,usd\n"
    )]
    fn test_write_accounts_csv(#[case] accounts: Vec<AccountView>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_accounts_csv(&accounts, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }

    #[test]
    fn test_write_payments_csv() {
        let payments = vec![
            PaymentView {
                id: 1,
                account: String::new(),
                to_account: "alice".into(),
                amount: Decimal::new(10, 0),
                direction: Direction::Outgoing,
                date: Utc::now(),
            },
            PaymentView {
                id: 2,
                account: "bobby".into(),
                to_account: "alice".into(),
                amount: Decimal::new(25, 1),
                direction: Direction::Incoming,
                date: Utc::now(),
            },
        ];

        let mut output = Vec::new();
        write_payments_csv(&payments, &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "id,account,to_account,amount,direction\n1,,alice,10.0000,outgoing\n2,bobby,alice,2.5000,incoming\n"
        );
    }
}
