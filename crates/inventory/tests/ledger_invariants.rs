//! Ledger invariant checks under randomized operation sequences.
//!
//! For any sequence of reserve/deduct/restock calls, accepted or rejected,
//! the counters must satisfy `stock_level >= 0` and
//! `0 <= reserved_stock <= stock_level`, and the version must move by
//! exactly 1 per accepted mutation.

use common::{OrderId, ProductId};
use inventory::{InMemoryLedger, InventoryError, InventoryLedger, StockDeduction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

async fn assert_invariants(ledger: &InMemoryLedger, pid: &ProductId) {
    let item = ledger.get(pid).await.unwrap().unwrap();
    assert!(
        item.reserved_stock <= item.stock_level,
        "reserved {} exceeds stock {}",
        item.reserved_stock,
        item.stock_level
    );
}

#[tokio::test]
async fn random_operation_sequences_never_violate_invariants() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let ledger = InMemoryLedger::new();
        let pid = ProductId::new("SKU-RAND");
        ledger.create_product(&pid, "Widget", 50).await.unwrap();

        let mut expected_version = 1i64;
        for _ in 0..200 {
            let qty = rng.gen_range(1..=20u32);
            let op = rng.gen_range(0..3u8);
            let outcome = match op {
                0 => ledger.reserve(&pid, qty, OrderId::new()).await.map(|_| ()),
                1 => {
                    ledger
                        .deduct(OrderId::new(), &[StockDeduction::new("SKU-RAND", qty)])
                        .await
                }
                _ => ledger.restock(&pid, qty).await.map(|_| ()),
            };

            match outcome {
                Ok(()) => expected_version += 1,
                Err(InventoryError::InsufficientStock { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }

            assert_invariants(&ledger, &pid).await;
            let item = ledger.get(&pid).await.unwrap().unwrap();
            assert_eq!(
                item.version, expected_version,
                "seed {seed}: version must increment by exactly 1 per accepted mutation"
            );
        }
    }
}

#[tokio::test]
async fn rejected_operations_leave_state_untouched() {
    let ledger = InMemoryLedger::new();
    let pid = ProductId::new("SKU-001");
    ledger.create_product(&pid, "Widget", 3).await.unwrap();

    let before = ledger.get(&pid).await.unwrap().unwrap();
    let err = ledger.reserve(&pid, 10, OrderId::new()).await.unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { .. }));

    let after = ledger.get(&pid).await.unwrap().unwrap();
    assert_eq!(before, after);
}
