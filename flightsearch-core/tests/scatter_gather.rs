//! Integration tests for the scatter-gather pipeline.
//!
//! These drive topic → routers → queue → aggregator → coordinator end to end
//! with stub providers on paused tokio time, so multi-second provider delays
//! and deadlines run instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use flightsearch_core::{
    run_aggregator, CoordinatorConfig, FlightOffer, FlightProvider, InMemorySearchStore,
    InquiryRouter, Payload, ProviderRegistry, ProviderReply, ProviderRequest, ProviderResponse,
    ProviderSelector, Queue, SearchCoordinator, SearchDispatch, SearchError, SearchId,
    SearchRequest, SearchStatus, SearchStatusReport, Topic,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Clone)]
enum Answer {
    Offers(Vec<f64>),
    Failure(&'static str),
    Panic,
}

struct StubProvider {
    id: &'static str,
    delay: Duration,
    answer: Answer,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(id: &'static str, delay_secs: u64, answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            id,
            delay: Duration::from_secs(delay_secs),
            answer,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FlightProvider for StubProvider {
    fn id(&self) -> &str {
        self.id
    }

    async fn search(&self, request: &ProviderRequest) -> Result<ProviderReply, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.answer {
            Answer::Offers(prices) => {
                let offers = prices
                    .iter()
                    .map(|price| offer(self.id, &request.request, *price))
                    .collect();
                Ok(ProviderReply::success(self.id, offers, self.delay))
            }
            Answer::Failure(reason) => Ok(ProviderReply::failure(self.id, *reason, self.delay)),
            Answer::Panic => panic!("{} blew up", self.id),
        }
    }
}

fn offer(provider: &str, request: &SearchRequest, price: f64) -> FlightOffer {
    let departure = Utc::now();
    FlightOffer {
        provider: provider.into(),
        flight_number: format!("{provider}{}", price as u32),
        airline: format!("{provider} Air"),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::minutes(300),
        origin: request.origin.clone(),
        destination: request.destination.clone(),
        price,
        currency: "USD".into(),
        duration_minutes: 300,
        stops: 0,
    }
}

fn request() -> SearchRequest {
    SearchRequest {
        origin: "JFK".into(),
        destination: "LAX".into(),
        departure_date: NaiveDate::from_ymd_opt(2030, 5, 1).expect("valid date"),
        passengers: 2,
        cabin_class: "economy".into(),
    }
}

struct Pipeline {
    topic: Topic,
    queue: Queue,
    coordinator: Arc<SearchCoordinator<InMemorySearchStore>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Pipeline {
    fn start(providers: Vec<Arc<StubProvider>>, timeout_seconds: u64) -> Self {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider).expect("register");
        }

        let topic = Topic::new("searches");
        let queue = Queue::new("responses");
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        for provider in registry.iter() {
            let router = InquiryRouter::new(Arc::clone(provider), queue.clone());
            tracker.spawn(router.run(topic.subscribe(), cancel.clone(), tracker.clone()));
        }

        let coordinator = Arc::new(
            SearchCoordinator::new(
                Arc::new(InMemorySearchStore::new()),
                topic.clone(),
                CoordinatorConfig { timeout_seconds },
                registry.ids(),
                cancel.clone(),
            )
            .expect("coordinator"),
        );
        tracker.spawn(run_aggregator(
            Arc::clone(&coordinator),
            queue.clone(),
            cancel.clone(),
        ));

        Self {
            topic,
            queue,
            coordinator,
            cancel,
            tracker,
        }
    }

    async fn wait_until(&self, id: &SearchId, want: SearchStatus) -> SearchStatusReport {
        for _ in 0..1_000 {
            let report = self.coordinator.get_status(id).await.expect("status");
            if report.status == want {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("search {id} never reached {want}");
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        tokio::time::timeout(Duration::from_secs(5), self.tracker.wait())
            .await
            .expect("tasks drain on shutdown");
    }
}

fn prices(report: &SearchStatusReport) -> Vec<f64> {
    report.offers.iter().map(|o| o.price).collect()
}

#[tokio::test(start_paused = true)]
async fn three_providers_complete_with_merged_sorted_offers() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 2, Answer::Offers(vec![300.0, 500.0])),
            StubProvider::new("B", 4, Answer::Failure("timeout")),
            StubProvider::new("C", 6, Answer::Offers(vec![400.0])),
        ],
        45,
    );

    let id = pipeline.coordinator.start_search(request()).await.expect("start");
    let initial = pipeline.coordinator.get_status(&id).await.expect("status");
    assert_eq!(initial.status, SearchStatus::Pending);
    assert_eq!(initial.progress, 0);

    let report = pipeline.wait_until(&id, SearchStatus::Completed).await;
    assert_eq!(prices(&report), vec![300.0, 400.0, 500.0]);
    assert_eq!(report.errors, vec!["B: timeout".to_string()]);
    assert_eq!(report.progress, 100);

    // The deadline passing afterwards changes nothing.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let later = pipeline.coordinator.get_status(&id).await.expect("status");
    assert_eq!(later.status, SearchStatus::Completed);
    assert_eq!(pipeline.coordinator.armed_deadlines(), 0);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn progress_never_decreases_while_pending() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 1, Answer::Offers(vec![100.0])),
            StubProvider::new("B", 3, Answer::Offers(vec![200.0])),
            StubProvider::new("C", 5, Answer::Offers(vec![50.0])),
        ],
        45,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");

    let mut seen = Vec::new();
    loop {
        let report = pipeline.coordinator.get_status(&id).await.expect("status");
        seen.push(report.progress);
        if report.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert!(seen.contains(&33));
    assert!(seen.contains(&66));
    assert_eq!(seen.last(), Some(&100));

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_providers_time_out_and_stay_timed_out() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 3, Answer::Offers(vec![100.0])),
            StubProvider::new("B", 3, Answer::Offers(vec![200.0])),
        ],
        1,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");

    let report = pipeline.wait_until(&id, SearchStatus::Timeout).await;
    assert!(report.offers.is_empty());
    assert_eq!(report.progress, 0);

    // Both providers answer after the deadline; the search stays timed out.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let later = pipeline.coordinator.get_status(&id).await.expect("status");
    assert_eq!(later.status, SearchStatus::Timeout);
    assert!(later.offers.is_empty());
    assert_eq!(later.progress, 0);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn partial_answers_before_deadline_are_kept_on_timeout() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 1, Answer::Offers(vec![250.0])),
            StubProvider::new("B", 30, Answer::Offers(vec![100.0])),
        ],
        10,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");

    let report = pipeline.wait_until(&id, SearchStatus::Timeout).await;
    assert_eq!(prices(&report), vec![250.0]);
    assert_eq!(report.progress, 50);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_response_does_not_complete_search_early() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 1, Answer::Offers(vec![300.0])),
            StubProvider::new("B", 20, Answer::Offers(vec![200.0])),
            StubProvider::new("C", 20, Answer::Offers(vec![100.0])),
        ],
        45,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");

    tokio::time::sleep(Duration::from_secs(2)).await;
    // A replayed answer from A arrives twice more before B and C respond.
    for _ in 0..2 {
        pipeline
            .queue
            .publish(ProviderResponse {
                search_id: id.clone(),
                provider_id: "A".into(),
                offers: vec![offer("A", &request(), 999.0)],
                success: true,
                error: None,
            })
            .expect("publish");
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    let mid = pipeline.coordinator.get_status(&id).await.expect("status");
    assert_eq!(mid.status, SearchStatus::Pending);
    assert_eq!(mid.progress, 33);
    assert_eq!(prices(&mid), vec![300.0]);

    let done = pipeline.wait_until(&id, SearchStatus::Completed).await;
    assert_eq!(prices(&done), vec![100.0, 200.0, 300.0]);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn completion_is_broadcast_once() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 1, Answer::Offers(vec![120.0])),
            StubProvider::new("B", 2, Answer::Failure("maintenance")),
        ],
        45,
    );
    let mut listener = pipeline.topic.subscribe();
    let id = pipeline.coordinator.start_search(request()).await.expect("start");
    pipeline.wait_until(&id, SearchStatus::Completed).await;

    let mut completions = Vec::new();
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_millis(100), listener.recv()).await
    {
        if let Payload::SearchCompleted(done) = envelope.payload {
            completions.push(done);
        }
    }
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].search_id, id);
    assert_eq!(completions[0].offers.len(), 1);
    assert_eq!(completions[0].errors, vec!["B: maintenance".to_string()]);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_provider_still_answers_with_failure() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 1, Answer::Offers(vec![310.0])),
            StubProvider::new("B", 1, Answer::Panic),
        ],
        45,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");

    let report = pipeline.wait_until(&id, SearchStatus::Completed).await;
    assert_eq!(prices(&report), vec![310.0]);
    assert_eq!(report.errors, vec!["B: internal error: B blew up".to_string()]);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_searches_are_independent() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 2, Answer::Offers(vec![300.0])),
            StubProvider::new("B", 3, Answer::Offers(vec![200.0])),
        ],
        45,
    );

    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(pipeline.coordinator.start_search(request()).await.expect("start"));
    }
    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    for id in &ids {
        let report = pipeline.wait_until(id, SearchStatus::Completed).await;
        assert_eq!(prices(&report), vec![200.0, 300.0]);
    }

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn selector_limits_which_router_answers() {
    let a = StubProvider::new("A", 1, Answer::Offers(vec![1.0]));
    let b = StubProvider::new("B", 1, Answer::Offers(vec![2.0]));
    let c = StubProvider::new("C", 1, Answer::Offers(vec![3.0]));

    let topic = Topic::new("searches");
    let queue = Queue::new("responses");
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    for provider in [&a, &b, &c] {
        let provider: Arc<dyn FlightProvider> = provider.clone();
        let router = InquiryRouter::new(provider, queue.clone());
        tracker.spawn(router.run(topic.subscribe(), cancel.clone(), tracker.clone()));
    }

    let mut responses = Box::pin(queue.consume());
    // Targeted broadcast: only B answers.
    topic.publish(SearchDispatch {
        search_id: SearchId::from("targeted"),
        selector: ProviderSelector::Provider("B".into()),
        request: request(),
    });
    let mut answered = Vec::new();
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_secs(3), responses.next()).await
    {
        if let Payload::ProviderResponded(response) = envelope.payload {
            answered.push(response.provider_id);
        }
    }
    assert_eq!(answered, vec!["B".to_string()]);

    // Broadcast to all: each router answers exactly once.
    topic.publish(SearchDispatch {
        search_id: SearchId::from("everyone"),
        selector: ProviderSelector::All,
        request: request(),
    });
    let mut answered = Vec::new();
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_secs(3), responses.next()).await
    {
        if let Payload::ProviderResponded(response) = envelope.payload {
            answered.push(response.provider_id);
        }
    }
    answered.sort();
    assert_eq!(answered, vec!["A", "B", "C"]);

    assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.calls.load(Ordering::SeqCst), 2);
    assert_eq!(c.calls.load(Ordering::SeqCst), 1);

    cancel.cancel();
    tracker.close();
    tracker.wait().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_loop_with_calls_in_flight() {
    let pipeline = Pipeline::start(
        vec![
            StubProvider::new("A", 600, Answer::Offers(vec![1.0])),
            StubProvider::new("B", 600, Answer::Offers(vec![2.0])),
        ],
        45,
    );
    let id = pipeline.coordinator.start_search(request()).await.expect("start");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let coordinator = Arc::clone(&pipeline.coordinator);
    pipeline.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = coordinator.get_status(&id).await.expect("status");
    assert_eq!(report.status, SearchStatus::Pending);
    assert_eq!(coordinator.armed_deadlines(), 0);
}
