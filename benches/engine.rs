//! Market performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use peg_market::{
    replay_into_market, Action, CancelPayload, Generator, GeneratorConfig, Market, MarketConfig,
    MemoryLedger, MemoryStore, SigningTier, Transaction,
};

fn fresh_state(config: &GeneratorConfig) -> (Market, MemoryStore, MemoryLedger) {
    let market = Market::new(MarketConfig::default());
    let mut repo = MemoryStore::new();
    let mut ledger = MemoryLedger::new();
    config.genesis().apply(&mut repo, &mut ledger).unwrap();
    market.install(&mut repo).unwrap();
    (market, repo, ledger)
}

fn bench_replay_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("market");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("replay_1000_mixed", |b| {
        b.iter_batched(
            || {
                let config = GeneratorConfig {
                    seed: 42,
                    num_transactions: N,
                    ..Default::default()
                };
                let state = fresh_state(&config);
                let txs = Generator::new(config).all_transactions();
                (state, txs)
            },
            |((market, mut repo, mut ledger), txs)| {
                replay_into_market(&market, &mut repo, &mut ledger, txs).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_limit_only(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("market");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("replay_1000_limit_orders", |b| {
        b.iter_batched(
            || {
                let config = GeneratorConfig {
                    seed: 7,
                    num_transactions: N,
                    market_ratio: 0.0,
                    cancel_ratio: 0.0,
                    expiration_ratio: 0.0,
                    ..Default::default()
                };
                let state = fresh_state(&config);
                let txs = Generator::new(config).all_transactions();
                (state, txs)
            },
            |((market, mut repo, mut ledger), txs)| {
                replay_into_market(&market, &mut repo, &mut ledger, txs).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    const RESTING: usize = 500;
    const CANCELS_PER_ITER: usize = 100;
    let mut group = c.benchmark_group("market");
    group.throughput(Throughput::Elements(CANCELS_PER_ITER as u64));
    group.bench_function("cancel_100_after_500_resting", |b| {
        b.iter_batched(
            || {
                // one-sided books: nothing crosses, every order rests
                let config = GeneratorConfig {
                    seed: 123,
                    num_transactions: RESTING,
                    buy_ratio: 1.0,
                    market_ratio: 0.0,
                    cancel_ratio: 0.0,
                    expiration_ratio: 0.0,
                    ..Default::default()
                };
                let (market, mut repo, mut ledger) = fresh_state(&config);
                let txs = Generator::new(config).all_transactions();
                let last = txs.last().map_or(0, |tx| tx.block_timestamp);
                let cancels: Vec<Transaction> = txs[..CANCELS_PER_ITER]
                    .iter()
                    .map(|tx| Transaction {
                        id: format!("cancel-{}", tx.id),
                        sender: tx.sender.clone(),
                        block_timestamp: last,
                        signing: SigningTier::Active,
                        payload: Action::Cancel(CancelPayload {
                            side: peg_market::Side::Buy,
                            id: tx.id.clone(),
                        }),
                    })
                    .collect();
                replay_into_market(&market, &mut repo, &mut ledger, txs).unwrap();
                (market, repo, ledger, cancels)
            },
            |(market, mut repo, mut ledger, cancels)| {
                for tx in &cancels {
                    market.execute(&mut repo, &mut ledger, tx).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_replay_throughput, bench_limit_only, bench_cancel);
criterion_main!(benches);
