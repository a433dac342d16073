use std::hint::black_box;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::future::join_all;
use http::{HeaderMap, StatusCode};
use reqpipe::prelude::{Client, MetricsCollector, Request, RetryPolicy, TransportRequest};
use reqpipe::{HeaderInterceptor, Transport, TransportError, TransportResponse};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

const USER_JSON: &[u8] = br#"{"id":1,"name":"Ada Lovelace","email":"ada@example.com"}"#;

#[derive(Deserialize)]
#[allow(dead_code)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[derive(Serialize)]
struct NewUser {
    name: &'static str,
    email: &'static str,
}

struct StaticTransport;

#[async_trait]
impl Transport for StaticTransport {
    async fn send(&self, _request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(USER_JSON),
        ))
    }
}

fn benchmark_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn benchmark_client() -> Client {
    Client::builder()
        .transport(StaticTransport)
        .retry_policy(RetryPolicy::exponential(3))
        .interceptor(
            HeaderInterceptor::try_new("x-api-key", "bench").expect("valid header interceptor"),
        )
        .metrics(MetricsCollector::new())
        .build()
}

fn bench_execute_latency(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client();
    let get = Request::get("https://api.example.com/users/1").query("expand", "profile");
    let post = Request::post("https://api.example.com/users").body(NewUser {
        name: "Ada Lovelace",
        email: "ada@example.com",
    });

    let mut group = c.benchmark_group("execute_latency");
    group.sample_size(80);
    group.bench_function("get_decode_user", |b| {
        b.to_async(&runtime).iter(|| async {
            let user: User = client
                .execute(&get)
                .await
                .expect("get should succeed");
            black_box(user.id);
        });
    });
    group.bench_function("post_encode_and_decode", |b| {
        b.to_async(&runtime).iter(|| async {
            let user: User = client
                .execute(&post)
                .await
                .expect("post should succeed");
            black_box(user.id);
        });
    });
    group.finish();
}

fn bench_concurrent_execute(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client();
    let request = Request::get("https://api.example.com/users/1");

    let mut group = c.benchmark_group("concurrent_execute");
    group.sample_size(40);
    for concurrency in [8_usize, 32, 64] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&runtime).iter(|| async {
                    let calls = (0..concurrency).map(|_| client.execute::<User, _>(&request));
                    for result in join_all(calls).await {
                        black_box(result.expect("concurrent call should succeed").id);
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5));
    targets = bench_execute_latency, bench_concurrent_execute
);
criterion_main!(benches);
