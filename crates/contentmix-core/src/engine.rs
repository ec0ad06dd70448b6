//! Batched concurrent fetch-and-merge.
//!
//! Each batch spawns one task per provider slot still needed, starting at the
//! request offset for the first batch and at position `0` afterwards. Tasks run
//! concurrently; their outcomes are awaited strictly in position order, so the
//! output order depends only on provider position and never on timing.
//!
//! ```text
//!  batch 1 (offset 1)        batch 2
//!  ┌────┬────┬────┐          ┌────┬────┐
//!  │ p1 │ p2 │ p3 │  ──────▶ │ p0 │ p1 │ ...
//!  └─┬──┴─┬──┴─┬──┘          └─┬──┴─┬──┘
//!    ▼    ▼    ▼               ▼    ▼
//!   sink (in position order)
//! ```
//!
//! The first slot whose primary and fallback both fail aborts the run. Items
//! already handed to the sink stay emitted.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{Client, FetchError};
use crate::error::MixError;
use crate::sink::ResultSink;
use crate::{
    ContentItem, ProviderDescriptor, ProviderId, ProviderRegistry, RequestCursor, ValidationError,
};

/// What happens to in-flight fetches of a batch when the run aborts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Leave tasks running to completion and discard their outcomes.
    #[default]
    Detach,
    /// Abort the tasks at their next suspension point.
    Cancel,
}

impl AbortPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detach => "detach",
            Self::Cancel => "cancel",
        }
    }
}

impl FromStr for AbortPolicy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "detach" => Ok(Self::Detach),
            "cancel" => Ok(Self::Cancel),
            other => Err(ValidationError::InvalidAbortPolicy {
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Query string passed to every client call.
    pub query: String,
    /// `limit` passed to every client call.
    pub items_per_fetch: usize,
    pub abort_policy: AbortPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query: String::from("default"),
            items_per_fetch: 1,
            abort_policy: AbortPolicy::Detach,
        }
    }
}

/// Result of one provider slot, primary or fallback.
#[derive(Debug)]
pub struct FetchOutcome {
    pub position: usize,
    pub provider: ProviderId,
    pub used_fallback: bool,
    pub result: Result<Vec<ContentItem>, FetchError>,
}

/// Statistics of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub emitted: usize,
    pub batches: usize,
    pub fallbacks: usize,
}

struct Slot {
    position: usize,
    provider: ProviderId,
    handle: JoinHandle<FetchOutcome>,
}

/// Fan-out/merge engine over a shared provider registry.
///
/// The engine is cheap to clone and safe to share across concurrent requests;
/// all per-request state lives in the [`RequestCursor`].
#[derive(Debug, Clone)]
pub struct BatchFetchEngine {
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
    query: Arc<str>,
}

impl BatchFetchEngine {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        let query = Arc::from(config.query.as_str());
        Self {
            registry,
            config,
            query,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs batches until the cursor's count is satisfied or a slot fails.
    ///
    /// Returns the first fetch failure (after its fallback, if any) or the
    /// first sink failure. Either way the sink is never called again.
    pub async fn run(
        &self,
        cursor: &mut RequestCursor,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, MixError> {
        let started = Instant::now();
        let providers = self.registry.len();
        let mut summary = RunSummary::default();

        if providers == 0 || cursor.count() == 0 {
            cursor.finish();
            return Ok(summary);
        }

        let mut start = cursor.offset();
        loop {
            let slots = self.dispatch(start, cursor);
            if slots.is_empty() {
                // offset beyond the provider count
                cursor.finish();
                break;
            }

            summary.batches += 1;
            debug!(
                batch = summary.batches,
                start,
                dispatched = slots.len(),
                "dispatched fetch batch"
            );

            let emitted_before = cursor.emitted();
            self.collect(slots, cursor, sink, &mut summary).await?;

            if cursor.is_done() {
                break;
            }
            if cursor.emitted() == emitted_before {
                warn!(
                    batch = summary.batches,
                    "batch produced no items; ending request early"
                );
                cursor.finish();
                break;
            }

            start = 0;
        }

        summary.emitted = cursor.emitted();
        info!(
            emitted = summary.emitted,
            requested = cursor.count(),
            batches = summary.batches,
            fallbacks = summary.fallbacks,
            latency_ms = elapsed_ms(started),
            "content mix completed"
        );
        Ok(summary)
    }

    fn dispatch(&self, start: usize, cursor: &RequestCursor) -> Vec<Slot> {
        let per_fetch = self.config.items_per_fetch.max(1);
        let needed = cursor.remaining().div_ceil(per_fetch);
        let end = self.registry.len().min(start.saturating_add(needed));

        (start..end)
            .filter_map(|position| {
                let descriptor = self.registry.descriptor_at(position)?.clone();
                Some(self.spawn_slot(position, descriptor, per_fetch))
            })
            .collect()
    }

    fn spawn_slot(&self, position: usize, descriptor: ProviderDescriptor, limit: usize) -> Slot {
        let provider = descriptor.id.clone();
        let primary = self.registry.resolve_client(&descriptor.id);
        let fallback = descriptor
            .fallback
            .as_ref()
            .and_then(|id| self.registry.resolve_client(id).map(|client| (id.clone(), client)));
        let query = Arc::clone(&self.query);

        let handle = tokio::spawn(async move {
            fetch_slot(position, descriptor.id, primary, fallback, query, limit).await
        });

        Slot {
            position,
            provider,
            handle,
        }
    }

    async fn collect(
        &self,
        slots: Vec<Slot>,
        cursor: &mut RequestCursor,
        sink: &mut dyn ResultSink,
        summary: &mut RunSummary,
    ) -> Result<(), MixError> {
        let mut pending = slots.into_iter();

        while let Some(slot) = pending.next() {
            let outcome = match slot.handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => FetchOutcome {
                    position: slot.position,
                    provider: slot.provider.clone(),
                    used_fallback: false,
                    result: Err(FetchError::task_failed(format!(
                        "fetch task for position {} did not complete: {join_error}",
                        slot.position
                    ))
                    .with_provider(slot.provider)),
                },
            };

            if outcome.used_fallback {
                summary.fallbacks += 1;
            }

            let items = match outcome.result {
                Ok(items) => items,
                Err(error) => {
                    let abandoned = self.abandon(pending);
                    warn!(
                        position = outcome.position,
                        provider = %outcome.provider,
                        code = error.code(),
                        abandoned,
                        policy = self.config.abort_policy.as_str(),
                        "provider slot failed; aborting request: {}",
                        error.message()
                    );
                    return Err(MixError::Fetch(error));
                }
            };

            let take = items.len().min(cursor.remaining());
            for item in items.into_iter().take(take) {
                if let Err(error) = sink.emit(item).await {
                    let abandoned = self.abandon(pending);
                    warn!(abandoned, "result sink failed; aborting request: {error}");
                    return Err(MixError::Sink(error));
                }
                cursor.record_emit();
            }
        }

        Ok(())
    }

    /// Gives up on the uncollected slots of an aborted batch.
    fn abandon(&self, rest: impl Iterator<Item = Slot>) -> usize {
        let mut abandoned = 0;
        for slot in rest {
            if self.config.abort_policy == AbortPolicy::Cancel {
                slot.handle.abort();
            }
            // dropping the handle detaches the task; its outcome is discarded
            abandoned += 1;
        }
        abandoned
    }
}

async fn fetch_slot(
    position: usize,
    provider: ProviderId,
    primary: Option<Arc<dyn Client>>,
    fallback: Option<(ProviderId, Arc<dyn Client>)>,
    query: Arc<str>,
    limit: usize,
) -> FetchOutcome {
    let primary_result = match primary {
        Some(client) => client.fetch(&query, limit).await,
        None => Err(FetchError::unavailable("no client registered")),
    };

    let error = match primary_result {
        Ok(items) => {
            return FetchOutcome {
                position,
                provider,
                used_fallback: false,
                result: Ok(items),
            };
        }
        Err(error) => error.with_provider(provider.clone()),
    };

    let Some((fallback_id, fallback_client)) = fallback else {
        return FetchOutcome {
            position,
            provider,
            used_fallback: false,
            result: Err(error),
        };
    };

    debug!(
        position,
        provider = %provider,
        fallback = %fallback_id,
        "primary fetch failed, trying fallback: {error}"
    );
    let result = fallback_client
        .fetch(&query, limit)
        .await
        .map_err(|error| error.with_provider(fallback_id));

    FetchOutcome {
        position,
        provider,
        used_fallback: true,
        result,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::client::ClientFuture;
    use crate::error::SinkError;
    use crate::sink::SinkFuture;
    use crate::sink::CollectingSink;
    use crate::{RegistryBuilder, UtcDateTime};

    fn id(value: &str) -> ProviderId {
        ProviderId::parse(value).expect("valid provider id")
    }

    fn item(source: &ProviderId) -> ContentItem {
        ContentItem::new(
            "x",
            "title",
            source.clone(),
            "summary",
            "https://example.com",
            UtcDateTime::parse("2030-01-01T00:00:00Z").expect("valid"),
        )
    }

    /// Client that succeeds or fails per call, after an optional delay.
    struct ScriptedClient {
        source: ProviderId,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
        finished: Arc<AtomicUsize>,
    }

    impl ScriptedClient {
        fn ok(source: &str) -> Self {
            Self {
                source: id(source),
                fail: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                finished: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(source: &str) -> Self {
            Self {
                fail: true,
                ..Self::ok(source)
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl Client for ScriptedClient {
        fn fetch<'a>(&'a self, _query: &'a str, limit: usize) -> ClientFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.finished.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(FetchError::unavailable("scripted failure"));
                }
                Ok((0..limit).map(|_| item(&self.source)).collect::<Vec<_>>())
            })
        }
    }

    fn registry(
        entries: &[(&str, Option<&str>)],
        clients: Vec<Arc<ScriptedClient>>,
    ) -> Arc<ProviderRegistry> {
        let mut builder = RegistryBuilder::new();
        for client in clients {
            let source = client.source.clone();
            builder = builder.with_client(source, client);
        }
        for (primary, fallback) in entries {
            builder = builder.with_entry(id(primary), fallback.map(id));
        }
        Arc::new(builder.build().expect("consistent registry"))
    }

    fn sources(sink: &CollectingSink) -> Vec<&str> {
        sink.items().iter().map(|item| item.source.as_str()).collect()
    }

    #[tokio::test]
    async fn example_scenario_wraps_into_second_batch() {
        let registry = registry(
            &[("a", None), ("b", None), ("c", None)],
            vec![
                Arc::new(ScriptedClient::ok("a")),
                Arc::new(ScriptedClient::ok("b")),
                Arc::new(ScriptedClient::ok("c")),
            ],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(4, 0);
        let mut sink = CollectingSink::new();

        let summary = engine.run(&mut cursor, &mut sink).await.expect("run succeeds");

        assert_eq!(sources(&sink), vec!["a", "b", "c", "a"]);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.emitted, 4);
        assert!(cursor.is_done());
    }

    #[tokio::test]
    async fn second_batch_dispatches_only_what_is_missing() {
        let a = Arc::new(ScriptedClient::ok("a"));
        let b = Arc::new(ScriptedClient::ok("b"));
        let registry = registry(&[("a", None), ("b", None)], vec![a.clone(), b.clone()]);
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(3, 0);
        let mut sink = CollectingSink::new();

        engine.run(&mut cursor, &mut sink).await.expect("run succeeds");

        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_item_keeps_fallback_source() {
        let registry = registry(
            &[("a", Some("b")), ("b", None)],
            vec![
                Arc::new(ScriptedClient::failing("a")),
                Arc::new(ScriptedClient::ok("b")),
            ],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(2, 0);
        let mut sink = CollectingSink::new();

        let summary = engine.run(&mut cursor, &mut sink).await.expect("fallback recovers");

        assert_eq!(sources(&sink), vec!["b", "b"]);
        assert_eq!(summary.fallbacks, 1);
    }

    #[tokio::test]
    async fn failing_slot_without_fallback_aborts_with_prefix() {
        let registry = registry(
            &[("a", None), ("b", None), ("c", None)],
            vec![
                Arc::new(ScriptedClient::ok("a")),
                Arc::new(ScriptedClient::failing("b")),
                Arc::new(ScriptedClient::ok("c")),
            ],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(6, 0);
        let mut sink = CollectingSink::new();

        let error = engine.run(&mut cursor, &mut sink).await.expect_err("slot b fails");

        assert_eq!(sources(&sink), vec!["a"]);
        assert_eq!(error.code(), "fetch.unavailable");
        match error {
            MixError::Fetch(fetch) => assert_eq!(fetch.provider().map(ProviderId::as_str), Some("b")),
            MixError::Sink(_) => panic!("expected fetch error"),
        }
        assert!(!cursor.is_done());
    }

    #[tokio::test]
    async fn failed_fallback_reports_fallback_provider() {
        let registry = registry(
            &[("a", Some("b"))],
            vec![
                Arc::new(ScriptedClient::failing("a")),
                Arc::new(ScriptedClient::failing("b")),
            ],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(1, 0);
        let mut sink = CollectingSink::new();

        let error = engine.run(&mut cursor, &mut sink).await.expect_err("both fail");

        assert!(sink.items().is_empty());
        let MixError::Fetch(fetch) = error else {
            panic!("expected fetch error");
        };
        assert_eq!(fetch.provider().map(ProviderId::as_str), Some("b"));
    }

    #[tokio::test]
    async fn detach_policy_lets_abandoned_fetches_finish() {
        let slow = Arc::new(ScriptedClient::ok("slow").delayed(Duration::from_millis(50)));
        let finished = Arc::clone(&slow.finished);
        let registry = registry(
            &[("bad", None), ("slow", None)],
            vec![Arc::new(ScriptedClient::failing("bad")), slow],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(2, 0);
        let mut sink = CollectingSink::new();

        engine.run(&mut cursor, &mut sink).await.expect_err("bad fails");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(sink.items().is_empty());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_policy_aborts_abandoned_fetches() {
        let slow = Arc::new(ScriptedClient::ok("slow").delayed(Duration::from_millis(200)));
        let finished = Arc::clone(&slow.finished);
        let registry = registry(
            &[("bad", None), ("slow", None)],
            vec![Arc::new(ScriptedClient::failing("bad")), slow],
        );
        let engine = BatchFetchEngine::with_config(
            registry,
            EngineConfig {
                abort_policy: AbortPolicy::Cancel,
                ..EngineConfig::default()
            },
        );
        let mut cursor = RequestCursor::new(2, 0);
        let mut sink = CollectingSink::new();

        engine.run(&mut cursor, &mut sink).await.expect_err("bad fails");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    /// Client returning no items at all.
    struct EmptyClient;

    impl Client for EmptyClient {
        fn fetch<'a>(&'a self, _query: &'a str, _limit: usize) -> ClientFuture<'a> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn empty_batches_do_not_loop_forever() {
        let registry = ProviderRegistry::new(
            vec![ProviderDescriptor::without_fallback(id("empty"))],
            HashMap::from([(id("empty"), Arc::new(EmptyClient) as Arc<dyn Client>)]),
        )
        .expect("consistent registry");
        let engine = BatchFetchEngine::new(Arc::new(registry));
        let mut cursor = RequestCursor::new(10, 0);
        let mut sink = CollectingSink::new();

        let summary = engine.run(&mut cursor, &mut sink).await.expect("run ends");

        assert_eq!(summary.batches, 1);
        assert_eq!(summary.emitted, 0);
        assert!(cursor.is_done());
    }

    /// Client returning more items than asked for.
    struct GreedyClient(ProviderId);

    impl Client for GreedyClient {
        fn fetch<'a>(&'a self, _query: &'a str, _limit: usize) -> ClientFuture<'a> {
            Box::pin(async move { Ok((0..5).map(|_| item(&self.0)).collect::<Vec<_>>()) })
        }
    }

    #[tokio::test]
    async fn never_emits_more_than_requested() {
        let registry = RegistryBuilder::new()
            .with_client(id("g"), Arc::new(GreedyClient(id("g"))))
            .with_entry(id("g"), None)
            .with_entry(id("g"), None)
            .build()
            .expect("consistent registry");
        let engine = BatchFetchEngine::new(Arc::new(registry));
        let mut cursor = RequestCursor::new(3, 0);
        let mut sink = CollectingSink::new();

        let summary = engine.run(&mut cursor, &mut sink).await.expect("run succeeds");

        assert_eq!(sink.items().len(), 3);
        assert_eq!(summary.batches, 1);
    }

    /// Sink that rejects everything after the first item.
    struct FlakySink {
        accepted: usize,
    }

    impl ResultSink for FlakySink {
        fn emit<'a>(&'a mut self, _item: ContentItem) -> SinkFuture<'a> {
            let result = if self.accepted >= 1 {
                Err(SinkError::Closed)
            } else {
                self.accepted += 1;
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn sink_failure_aborts_run() {
        let registry = registry(
            &[("a", None), ("b", None)],
            vec![Arc::new(ScriptedClient::ok("a")), Arc::new(ScriptedClient::ok("b"))],
        );
        let engine = BatchFetchEngine::new(registry);
        let mut cursor = RequestCursor::new(4, 0);
        let mut sink = FlakySink { accepted: 0 };

        let error = engine.run(&mut cursor, &mut sink).await.expect_err("sink closes");

        assert!(matches!(error, MixError::Sink(_)));
        assert_eq!(cursor.emitted(), 1);
    }

    #[test]
    fn abort_policy_parses_case_insensitively() {
        assert_eq!("Cancel".parse::<AbortPolicy>(), Ok(AbortPolicy::Cancel));
        assert_eq!(" detach ".parse::<AbortPolicy>(), Ok(AbortPolicy::Detach));
        assert!("later".parse::<AbortPolicy>().is_err());
    }
}
