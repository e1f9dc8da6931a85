//! Property tests for the ledger invariants
//!
//! Random command sequences run against the in-memory backend and a plain
//! model of the balances. After every sequence the ledger must agree with the
//! model, conserve deposited money, and never hold a negative balance.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use wallet_ledger::{Ledger, LedgerConfig, MemoryStorage, ServiceError};

const NAMES: [&str; 3] = ["alice", "bob01", "carol"];

#[derive(Debug, Clone)]
enum Op {
    Deposit { to: usize, cents: i64 },
    Transfer { from: usize, to: usize, cents: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NAMES.len(), 0i64..5_000).prop_map(|(to, cents)| Op::Deposit { to, cents }),
        (0..NAMES.len(), 0..NAMES.len(), 0i64..5_000)
            .prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
    ]
}

/// Balances the ledger is expected to hold
#[derive(Debug, Default)]
struct Model {
    balances: [Decimal; 3],
    deposited: Decimal,
}

impl Model {
    fn expected(&self, op: &Op) -> Result<(), ServiceError> {
        match *op {
            Op::Deposit { cents, .. } if cents <= 0 => Err(ServiceError::AmountInvalid),
            Op::Deposit { .. } => Ok(()),
            Op::Transfer { from, to, .. } if from == to => Err(ServiceError::SelfTransfer),
            Op::Transfer { cents, .. } if cents <= 0 => Err(ServiceError::AmountInvalid),
            Op::Transfer { from, cents, .. } if self.balances[from] < Decimal::new(cents, 2) => {
                Err(ServiceError::InsufficientFunds)
            }
            Op::Transfer { .. } => Ok(()),
        }
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Deposit { to, cents } => {
                self.balances[to] += Decimal::new(cents, 2);
                self.deposited += Decimal::new(cents, 2);
            }
            Op::Transfer { from, to, cents } => {
                self.balances[from] -= Decimal::new(cents, 2);
                self.balances[to] += Decimal::new(cents, 2);
            }
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime builds")
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    /// Property: the ledger accepts exactly the commands the model accepts,
    /// the sum of balances equals the sum of accepted deposits, and no
    /// balance ever goes below zero.
    #[test]
    fn balances_are_conserved_and_non_negative(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let (balances, total, model) = runtime().block_on(async {
            let storage = Arc::new(MemoryStorage::default());
            let ledger = Ledger::with_storage(Arc::clone(&storage), &LedgerConfig::default());
            let service = ledger.service();
            for name in NAMES {
                service.create_account(name).await.unwrap();
            }

            let mut model = Model::default();
            for op in &ops {
                let result = match *op {
                    Op::Deposit { to, cents } => service
                        .deposit(NAMES[to], Decimal::new(cents, 2))
                        .await
                        .map(|_| ()),
                    Op::Transfer { from, to, cents } => service
                        .transfer(NAMES[from], NAMES[to], Decimal::new(cents, 2))
                        .await
                        .map(|_| ()),
                };
                assert_eq!(result, model.expected(op), "op {:?}", op);
                if result.is_ok() {
                    model.apply(op);
                }
            }

            let mut balances = Vec::new();
            for name in NAMES {
                balances.push(service.account(name).await.unwrap().balance);
            }
            let total = storage.total_balance().await.unwrap();
            ledger.shutdown().await;
            (balances, total, model)
        });

        prop_assert_eq!(total, model.deposited);
        prop_assert_eq!(balances.as_slice(), model.balances.as_slice());
        for balance in balances {
            prop_assert!(balance >= Decimal::ZERO);
        }
    }

    /// Property: every page of the account listing is the matching window of
    /// the full listing.
    #[test]
    fn account_pages_are_windows_of_the_full_list(offset in 0i64..8, limit in -1i64..8) {
        let (page, full) = runtime().block_on(async {
            let ledger = Ledger::open(LedgerConfig::default()).await.unwrap();
            let service = ledger.service();
            for name in ["alice", "bob01", "carol", "david", "ellen"] {
                service.create_account(name).await.unwrap();
            }
            let page = service.accounts_list(offset, limit).await.unwrap();
            let full = service.accounts_list(0, -1).await.unwrap();
            ledger.shutdown().await;
            (page, full)
        });

        let start = (offset as usize).min(full.len());
        let end = if limit < 0 {
            full.len()
        } else {
            (start + limit as usize).min(full.len())
        };
        prop_assert_eq!(page, full[start..end].to_vec());
    }
}
