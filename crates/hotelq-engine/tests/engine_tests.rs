use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use hotelq_core::config::GeoConfig;
use hotelq_core::{fields, Context, PartialState, Stage};
use hotelq_embed::NgramEmbedder;
use hotelq_engine::testing::{
    FailingExtractor, Fixtures, RecordingProgress, StaticBackend, StaticExtractor,
};
use hotelq_engine::{ChannelProgress, Engine, EngineBuilder, EngineError, HotelSearch, RunStatus};
use hotelq_geo::{GeoResolverCache, StaticGeoSource};

fn fixtures() -> Fixtures {
    serde_json::from_value(json!({
        "hotels": [
            {"id": 1, "name": "信義安和飯店", "region_id": 1, "subregion_id": 101, "price": 3200,
             "max_guests": 4, "facility_ids": [1], "has_breakfast": true},
            {"id": 2, "name": "大安森林旅店", "region_id": 1, "subregion_id": 102, "price": 2600,
             "max_guests": 2},
            {"id": 3, "name": "安平港景民宿", "region_id": 4, "subregion_id": 401, "price": 1800,
             "type": "homestay"},
        ],
        "plans": [
            {"plan_id": "p-1", "hotel_name": "信義安和飯店", "plan_name": "雙人早餐專案",
             "price": 3500, "region_id": 1},
        ],
        "pois": [
            {"hotel_name": "信義安和飯店", "keyword": "夜市", "name": "臨江街夜市"},
        ],
    }))
    .unwrap()
}

fn geo(dir: &TempDir) -> Arc<GeoResolverCache> {
    Arc::new(GeoResolverCache::new(
        dir.path(),
        &GeoConfig::default(),
        Arc::new(StaticGeoSource::taiwan_sample()),
        Arc::new(NgramEmbedder::new(256)),
    ))
}

fn session(id: &str) -> Context {
    let mut ctx = Context::new();
    ctx.insert("session_id".into(), json!(id));
    ctx
}

fn reference(dir: &TempDir, backend: Arc<StaticBackend>) -> EngineBuilder {
    Engine::builder().with_reference_pipeline(backend, geo(dir))
}

/// Filters handed over directly, bypassing the text extractors.
fn stub(patch: PartialState) -> StaticExtractor {
    let owned: Vec<&'static str> = [
        fields::REGION_IDS,
        fields::SUBREGION_IDS,
        fields::REGION_NAMES,
        fields::CHECK_IN,
        fields::CHECK_OUT,
        fields::PRICE_MAX,
        fields::HOTEL_FACILITY_IDS,
    ]
    .to_vec();
    StaticExtractor::new("stub", &owned, patch)
}

fn stay() -> PartialState {
    PartialState::new()
        .with(fields::REGION_IDS, json!([1]))
        .with(fields::CHECK_IN, "2025-03-01")
        .with(fields::CHECK_OUT, "2025-03-03")
}

fn diagnostics(state: &hotelq_core::SharedState) -> String {
    state.str_field(fields::DIAGNOSTICS).unwrap_or_default().to_string()
}

#[tokio::test]
async fn region_subregion_dates_and_guests_succeed_on_first_pass() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let engine = reference(&dir, backend.clone()).build().unwrap();

    let res = engine.run("台北市信義區 2025-03-01到2025-03-03 2大", &Context::new()).await.unwrap();

    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(res.retry_count(), 0);
    assert_eq!(res.state.ids(fields::REGION_IDS), vec![1]);
    assert_eq!(res.state.ids(fields::SUBREGION_IDS), vec![101]);
    assert_eq!(res.state.i64_field(fields::ADULTS), Some(2));
    let hotels: Vec<i64> =
        res.state.list("hotels").iter().filter_map(|h| h["id"].as_i64()).collect();
    assert_eq!(hotels, vec![1]);
    assert!(res.state.strings(fields::RELAXED).is_empty());
    assert!(!res.stages.contains(&Stage::RelaxedRetry));
    assert_eq!(backend.calls(), 1);
    assert_eq!(res.state.get(fields::RESPONSE)["total"], json!(1));
}

#[tokio::test]
async fn nearby_places_follow_the_hotel_search() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let engine = reference(&dir, backend.clone()).build().unwrap();

    let query = "台北市信義區 2025-03-01到2025-03-03 靠近夜市";
    let res = engine.run(query, &Context::new()).await.unwrap();

    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(res.state.strings(fields::POI_KEYWORDS), vec!["夜市".to_string()]);
    assert!(res.state.flag(&fields::searched("poi_search")));
    let pois = res.state.list(fields::POIS);
    assert_eq!(pois.len(), 1);
    assert_eq!(pois[0]["hotel_id"], 1);
    assert_eq!(pois[0]["pois"]["夜市"][0]["name"], "臨江街夜市");
    let searching = res.stages.iter().filter(|s| **s == Stage::Searching).count();
    assert_eq!(searching, 2, "places are looked up once hotels exist");
    assert_eq!(backend.calls(), 2);
    assert_eq!(res.state.get(fields::RESPONSE)["total"], json!(1));
}

#[tokio::test]
async fn price_only_query_exhausts_retries_without_error() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let engine = reference(&dir, backend.clone()).build().unwrap();

    let res = engine.run("預算3000以下", &Context::new()).await.unwrap();

    assert_eq!(res.status, RunStatus::Exhausted);
    assert_eq!(res.retry_count(), 2);
    assert!(!res.state.is_present(fields::ERROR));
    assert_eq!(res.state.strings(fields::RELAXED), vec!["price".to_string()]);
    assert_eq!(res.state.get(fields::PRICE_MAX), &Value::Null, "relaxed away");
    assert!(diagnostics(&res.state).contains("exhausted after 2 retries"));
    assert_eq!(backend.calls(), 0, "nothing was ever eligible");
    assert_eq!(res.stages.last(), Some(&Stage::Done));
}

#[tokio::test]
async fn relaxing_price_reopens_the_search() {
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let engine = Engine::builder()
        .extractor(stub(stay().with(fields::PRICE_MAX, 1000)))
        .search(HotelSearch::new(backend.clone()))
        .build()
        .unwrap();

    let res = engine.run("cheap taipei", &Context::new()).await.unwrap();

    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(res.retry_count(), 1);
    assert_eq!(res.state.strings(fields::RELAXED), vec!["price".to_string()]);
    assert_eq!(res.state.list("hotels").len(), 2);
    assert_eq!(backend.calls(), 2);
    assert!(res.stages.contains(&Stage::RelaxedRetry));
}

#[tokio::test]
async fn failing_extractor_leaves_its_default_and_flags_advance() {
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let fallback = PartialState::new().with(fields::ADULTS, 1);
    let guest = FailingExtractor::new("guest", &[fields::ADULTS], fallback);
    let meal =
        FailingExtractor::new("meal", &[fields::HAS_BREAKFAST], PartialState::new()).panicking();
    let engine = Engine::builder()
        .extractor(stub(stay()))
        .extractor(guest)
        .extractor(meal)
        .search(HotelSearch::new(backend))
        .build()
        .unwrap();

    let res = engine.run("anything", &Context::new()).await.unwrap();

    assert_eq!(res.status, RunStatus::Completed);
    assert_eq!(res.state.i64_field(fields::ADULTS), Some(1));
    assert!(res.state.flag(&fields::parsed("guest")));
    assert!(res.state.flag(&fields::parsed("meal")));
    assert!(res.state.flag(&fields::searched("hotel_search")));
    let log = diagnostics(&res.state);
    assert!(log.contains("extractor guest failed"));
    assert!(log.contains("extractor meal panicked"));
    assert!(!res.state.list("hotels").is_empty());
}

#[tokio::test]
async fn retry_count_never_exceeds_the_maximum() {
    for max in 0..=3u32 {
        let backend = Arc::new(StaticBackend::failing());
        let filters = stay()
            .with(fields::PRICE_MAX, 5000)
            .with(fields::HOTEL_FACILITY_IDS, json!([1]))
            .with(fields::SUBREGION_IDS, json!([101]));
        let engine = Engine::builder()
            .max_retries(max)
            .extractor(stub(filters))
            .search(HotelSearch::new(backend.clone()))
            .build()
            .unwrap();

        let res = engine.run("anything", &Context::new()).await.unwrap();

        assert_eq!(res.status, RunStatus::Exhausted, "max={max}");
        assert_eq!(res.retry_count(), max);
        assert_eq!(
            backend.calls(),
            max as usize + 1,
            "every effective relaxation reopens the search"
        );
        assert!(diagnostics(&res.state).contains("search hotel_search failed"));
    }
}

#[tokio::test]
async fn progress_sink_does_not_change_the_outcome() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let recorder = Arc::new(RecordingProgress::new());
    let quiet = reference(&dir, backend.clone()).build().unwrap();
    let observed = reference(&dir, backend).progress(recorder.clone()).build().unwrap();

    let query = "台北大安 2025-03-01 2人 預算3000以下";
    let a = quiet.run(query, &session("s-1")).await.unwrap();
    let b = observed.run(query, &session("s-1")).await.unwrap();

    let strip = |mut v: Value| {
        if let Some(o) = v.as_object_mut() {
            o.remove(fields::TIMESTAMP);
        }
        v
    };
    assert_eq!(strip(a.state.to_json()), strip(b.state.to_json()));
    assert_eq!(a.stages, b.stages);
    assert_eq!(recorder.stages(), b.stages);
    assert_eq!(recorder.stages().first(), Some(&Stage::Initial));
    assert_eq!(recorder.stages().last(), Some(&Stage::Done));
}

#[tokio::test]
async fn deadline_yields_a_timeout_state() {
    let engine = Engine::builder()
        .extractor(stub(stay()).with_delay(Duration::from_millis(500)))
        .search(HotelSearch::new(Arc::new(StaticBackend::new(fixtures()))))
        .build()
        .unwrap();

    let res =
        engine.run_with_deadline("slow", &Context::new(), Duration::from_millis(20)).await.unwrap();

    assert_eq!(res.status, RunStatus::TimedOut);
    assert_eq!(res.state.str_field(fields::ERROR), Some("timeout"));
    assert!(res.state.str_field(fields::DIAGNOSTIC).is_some_and(|d| d.contains("timed out")));
    assert!(res.state.list("hotels").is_empty(), "no partial data");
    assert!(!res.state.is_present(fields::REGION_IDS));
    assert_eq!(res.stages, vec![Stage::Initial, Stage::Error]);
}

#[tokio::test]
async fn channel_progress_streams_every_stage() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::builder()
        .extractor(stub(stay()))
        .search(HotelSearch::new(Arc::new(StaticBackend::new(fixtures()))))
        .progress(Arc::new(ChannelProgress::new(tx)))
        .build()
        .unwrap();

    let res = engine.run("anything", &Context::new()).await.unwrap();

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        stages.push(event.stage);
        if event.stage == Stage::Searching {
            assert_eq!(event.result_counts.get("hotels"), Some(&2));
        }
    }
    assert_eq!(stages, res.stages);
    assert_eq!(
        stages,
        vec![
            Stage::Initial,
            Stage::Parsing,
            Stage::Routing,
            Stage::Searching,
            Stage::Routing,
            Stage::Aggregating,
            Stage::Done
        ]
    );
}

#[tokio::test]
async fn records_without_a_key_are_dropped_and_duplicates_merge() {
    let fixtures: Fixtures = serde_json::from_value(json!({
        "hotels": [
            {"id": 7, "name": "A", "region_id": 1},
            {"id": 7, "name": "A again", "region_id": 1},
            {"name": "no id", "region_id": 1},
        ]
    }))
    .unwrap();
    let engine = Engine::builder()
        .extractor(stub(stay()))
        .search(HotelSearch::new(Arc::new(StaticBackend::new(fixtures))))
        .build()
        .unwrap();

    let res = engine.run("anything", &Context::new()).await.unwrap();

    assert_eq!(res.state.list("hotels").len(), 1);
    assert!(diagnostics(&res.state).contains("dropped 1 record(s) without 'id'"));
}

#[tokio::test]
async fn destination_context_and_unresolved_names() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(StaticBackend::new(fixtures()));
    let engine = reference(&dir, backend).build().unwrap();

    let mut ctx = Context::new();
    ctx.insert("destination".into(), json!("台南安平"));
    let res = engine.run("2025-03-01 民宿", &ctx).await.unwrap();
    assert_eq!(res.state.ids(fields::REGION_IDS), vec![4]);
    assert_eq!(res.state.ids(fields::SUBREGION_IDS), vec![401]);
    assert_eq!(res.state.list("hotels").len(), 1);

    let engine = Engine::builder()
        .extractor(stub(PartialState::new().with(fields::REGION_NAMES, json!(["Atlantis"]))))
        .geo(geo(&dir))
        .build()
        .unwrap();
    let res = engine.run("atlantis", &Context::new()).await.unwrap();
    assert!(diagnostics(&res.state).contains("unresolved region 'Atlantis'"));
    assert_eq!(res.status, RunStatus::Exhausted);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let engine = Engine::builder().build().unwrap();
    let res = engine.run(" \u{3000} ", &Context::new()).await;
    assert!(matches!(res, Err(EngineError::EmptyQuery)));
}

#[tokio::test]
async fn operation_with_unknown_field_fails_at_build() {
    use async_trait::async_trait;
    use hotelq_core::{SearchError, SearchFilters, SearchOperation};

    struct Broken;

    #[async_trait]
    impl SearchOperation for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn result_field(&self) -> &str {
            "broken_results"
        }
        fn dedup_key(&self) -> &str {
            "id"
        }
        fn prerequisites(&self) -> &[&str] {
            &["no_such_field"]
        }
        async fn search(&self, _: &SearchFilters) -> Result<Vec<Value>, SearchError> {
            Ok(Vec::new())
        }
    }

    let err = Engine::builder().search(Broken).build();
    assert!(matches!(
        err,
        Err(EngineError::UnknownOperationField { field, .. }) if field == "no_such_field"
    ));
}
