//! Dispatch benchmark suite.
//!
//! Benchmarks the inbound path and a full call round trip:
//! - Codec decode of each envelope shape
//! - Dispatcher routing of requests and notifications
//! - Bridge-to-bridge calls over the in-memory transport
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use panel_bridge::protocol::decode;
use panel_bridge::rpc::{Dispatch, Dispatcher, MethodRegistry, PendingCalls};
use panel_bridge::transport::ChannelTransport;
use panel_bridge::{Bridge, BridgeOptions};

// ============================================================================
// Inputs
// ============================================================================

const REQUEST: &str = r#"{"jsonrpc":"2.0","method":"echo","params":{"v":1},"id":7}"#;
const NOTIFICATION: &str = r#"{"jsonrpc":"2.0","method":"tick","params":{"v":1}}"#;
const RESPONSE: &str = r#"{"jsonrpc":"2.0","result":{"v":1},"id":7}"#;

const CONCURRENT_CALLS: &[usize] = &[1, 16, 64];

// ============================================================================
// Benchmark: Codec
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (name, text) in [("request", REQUEST), ("notification", NOTIFICATION), ("response", RESPONSE)] {
        group.bench_function(name, |b| b.iter(|| decode(black_box(text))));
    }

    group.finish();
}

// ============================================================================
// Benchmark: Dispatcher
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut registry = MethodRegistry::new();
    registry
        .register_handler("echo", |params: Value| async move { Ok(params) })
        .expect("register");
    registry.register_listener("tick", |_: Value| {});

    let dispatcher = Dispatcher::new(Arc::new(registry), PendingCalls::new(16));

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("request", |b| {
        b.to_async(&rt).iter(|| async {
            match dispatcher.dispatch(black_box(REQUEST)) {
                Dispatch::Handle(fut) => {
                    black_box(fut.await);
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    });

    group.bench_function("notification", |b| {
        b.iter(|| dispatcher.dispatch(black_box(NOTIFICATION)));
    });

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let (host, _panel) = rt.block_on(async {
        let (a, b) = ChannelTransport::pair();
        let host = Bridge::new(a, BridgeOptions::default().with_max_pending(1024)).expect("host");
        let panel = Bridge::new(b, BridgeOptions::default()).expect("panel");
        panel
            .register_handler("echo", |params: Value| async move { Ok(params) })
            .expect("register");
        host.initialize().expect("init host");
        panel.initialize().expect("init panel");
        (host, panel)
    });

    let mut group = c.benchmark_group("round_trip");

    for &count in CONCURRENT_CALLS {
        group.bench_with_input(BenchmarkId::new("echo", count), &count, |b, &calls| {
            b.to_async(&rt).iter(|| {
                let host = host.clone();
                async move {
                    let replies = (0..calls).map(|i| {
                        let host = host.clone();
                        async move { host.call::<_, Value>("echo", json!({"v": i})).await }
                    });
                    for reply in futures_util::future::join_all(replies).await {
                        black_box(reply.expect("echo"));
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_dispatch, bench_round_trip);
criterion_main!(benches);
