use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use tokio::runtime::Runtime;
use wager_ledger::{MemoryStore, TransactionProcessor, TransactionRequest, UserId};

/// Generates valid request sequences for benchmarking.
///
/// Pattern per user (repeating):
/// 1. Win 100
/// 2. Win 50
/// 3. Lose 30
///
/// This ensures losses never exceed the balance when applied in order.
pub struct RequestGenerator {
    next_txn: u64,
    num_users: UserId,
    txns_per_user: u32,
    current_user: UserId,
    current_step: u32,
}

impl RequestGenerator {
    pub fn new(num_users: UserId, txns_per_user: u32) -> Self {
        Self {
            next_txn: 1,
            num_users,
            txns_per_user,
            current_user: 1,
            current_step: 0,
        }
    }
}

impl Iterator for RequestGenerator {
    type Item = TransactionRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_user > self.num_users {
            return None;
        }

        let txn = self.next_txn;
        self.next_txn += 1;

        let (state, amount) = match self.current_step % 3 {
            0 => ("win", "100.00"),
            1 => ("win", "50.00"),
            _ => ("lose", "30.00"),
        };
        let request = TransactionRequest {
            user_id: self.current_user,
            source_type: "game".to_string(),
            state: state.to_string(),
            amount: amount.to_string(),
            transaction_id: format!("txn-{txn}"),
        };

        self.current_step += 1;

        // Move to next user after txns_per_user requests
        if self.current_step >= self.txns_per_user {
            self.current_step = 0;
            self.current_user += 1;
        }

        Some(request)
    }
}

fn processor(num_users: UserId) -> TransactionProcessor<MemoryStore> {
    let users: Vec<UserId> = (1..=num_users).collect();
    TransactionProcessor::new(Arc::new(MemoryStore::with_accounts(&users)))
}

fn bench_sequential(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("sequential");

    for count in [1_000u32, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move {
                let processor = processor(1);
                for request in RequestGenerator::new(1, count) {
                    let _ = black_box(processor.process(&request).await);
                }
                processor
            });
        });
    }

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent");

    // Many users spread the per-account locks, few users contend on them
    for (users, txns_per) in [(100, 100), (10, 1_000), (1, 10_000)] {
        let label = format!("{}u_{}tx", users, txns_per);
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(users, txns_per),
            |b, &(users, txns_per)| {
                b.to_async(&rt).iter(|| async move {
                    let processor = processor(users).with_max_in_flight(256);
                    let requests = RequestGenerator::new(users, txns_per);
                    black_box(processor.run(tokio_stream::iter(requests)).await)
                });
            },
        );
    }

    group.finish();
}

fn bench_replays(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("replays");

    // Every request submitted twice: second pass hits the idempotency look-up
    group.bench_function("10k_twice", |b| {
        b.to_async(&rt).iter(|| async {
            let processor = processor(10);
            let requests: Vec<_> = RequestGenerator::new(10, 1_000).collect();
            for request in requests.iter().chain(requests.iter()) {
                let _ = black_box(processor.process(request).await);
            }
            processor
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sequential, bench_concurrent, bench_replays);
criterion_main!(benches);
