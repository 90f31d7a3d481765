//! Performance benchmarks for change detection and the subscription store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use topicwatch::{
    canonicalize_query, CancellationSignal, ChangeSummary, DataStore, EmailAddress, Frequency,
    ManualClock, PretendEmailSender, Repositories, Result, SearchResultItem, SearchResults,
    ServiceConfig, StoreConfig, Subscription, SubscriptionEngine, TemplateIds, Timestamp,
    TokenSealer, Topic, TopicContent, TopicSource, TrackedRecord,
};
use uuid::Uuid;

fn results(n: usize, suffix: &str) -> Vec<SearchResultItem> {
    (0..n)
        .map(|i| SearchResultItem::new(Uuid::from_u128(i as u128), format!("Item {i}{suffix}")))
        .collect()
}

fn subscription(i: usize) -> Subscription {
    Subscription::new(
        EmailAddress::parse(&format!("user{i}@example.com")).unwrap(),
        Topic::Search {
            query: format!("q={i}"),
            label: None,
        },
        Frequency::Realtime,
        Timestamp::from_secs(0),
    )
}

fn bench_canonicalize(c: &mut Criterion) {
    let raw = "?sort=name&pagenumber=4&type=lab&area=north&area=east&q=bob%20smith&pagesize=20";
    c.bench_function("canonicalize_query", |b| {
        b.iter(|| black_box(canonicalize_query(black_box(raw), &["pagenumber", "pagesize", "sort"])));
    });
}

/// Thumbprinting and diffing with varying result-set sizes
fn bench_change_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_detection");

    for size in [10, 100, 1000] {
        let old = results(size, "");
        let mut new = results(size, "");
        new[size / 2].name = Some("renamed".into());

        group.bench_with_input(BenchmarkId::new("thumbprint", size), &old, |b, items| {
            b.iter(|| black_box(TopicContent::from_search(items.clone()).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("diff", size), &(old, new), |b, (old, new)| {
            b.iter(|| black_box(ChangeSummary::between(old, new)));
        });
    }

    group.finish();
}

fn bench_tokens(c: &mut Criterion) {
    let sealer = TokenSealer::new("bench-secret").unwrap();
    let sub = subscription(1);
    let token = sealer.enclose(&sub, Timestamp::from_secs(0), 168).unwrap();

    c.bench_function("token_enclose", |b| {
        b.iter(|| black_box(sealer.enclose(&sub, Timestamp::from_secs(0), 168).unwrap()));
    });
    c.bench_function("token_disclose", |b| {
        b.iter(|| {
            let opened: Subscription = sealer.disclose(&token, Timestamp::from_secs(60)).unwrap();
            black_box(opened)
        });
    });
}

fn bench_table_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_upsert");

    for existing in [10, 1000] {
        group.bench_with_input(BenchmarkId::new("existing", existing), &existing, |b, &n| {
            let dir = TempDir::new().unwrap();
            let store = DataStore::create(StoreConfig {
                path: dir.path().join("store"),
                blob_cache_size: 1000,
                create_if_missing: true,
            })
            .unwrap();
            let repositories = store.repositories();
            for i in 0..n {
                repositories.subscriptions.upsert(&subscription(i)).unwrap();
            }

            let mut i = n;
            b.iter(|| {
                repositories.subscriptions.upsert(&subscription(i)).unwrap();
                i += 1;
            });
        });
    }

    group.finish();
}

struct StaticSource(Vec<SearchResultItem>);

impl TopicSource for StaticSource {
    fn search(&self, _query: &str) -> Result<SearchResults> {
        Ok(SearchResults::new(self.0.clone()))
    }

    fn get_record(&self, _id: Uuid) -> Result<Option<TrackedRecord>> {
        Ok(None)
    }
}

/// A no-change cycle over in-memory subscriptions
fn bench_cycle(c: &mut Criterion) {
    let config = ServiceConfig {
        encryption_secret: "bench-secret".into(),
        templates: TemplateIds {
            confirm_search_subscription: "t".into(),
            confirm_record_subscription: "t".into(),
            confirm_update_email_address: "t".into(),
            search_updated: "t".into(),
            record_updated: "t".into(),
            subscribed_search: "t".into(),
            subscribed_record: "t".into(),
        },
        ..ServiceConfig::default()
    };

    let repositories = Repositories::in_memory();
    for i in 0..200 {
        repositories.subscriptions.upsert(&subscription(i)).unwrap();
    }

    let engine = SubscriptionEngine::new(
        &config,
        repositories,
        Arc::new(StaticSource(results(50, ""))),
        Arc::new(PretendEmailSender::new()),
        Arc::new(ManualClock::new(Timestamp::from_secs(0))),
    )
    .unwrap();
    // First pass initialises everything.
    engine.run_cycle(&CancellationSignal::new()).unwrap();

    c.bench_function("cycle_no_change_200", |b| {
        b.iter(|| black_box(engine.run_cycle(&CancellationSignal::new()).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_change_detection,
    bench_tokens,
    bench_table_upsert,
    bench_cycle,
);

criterion_main!(benches);
