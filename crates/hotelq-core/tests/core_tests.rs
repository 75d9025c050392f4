use std::path::Path;
use std::sync::Arc;

use figment::Jail;
use hotelq_core::config::{expand_path, resolve_with_base, AppConfig, Config, EmbedBackend};
use hotelq_core::{
    fields, AnchorHotel, Error, PartialState, Reducer, RelaxStep, Schema, SearchFilters,
};
use serde_json::json;

#[test]
fn defaults_apply_without_any_config_file() {
    Jail::expect_with(|_jail| {
        let config = Config::load_for_env("test").map_err(|e| e.to_string())?;
        let app = config.app().map_err(|e| e.to_string())?;
        assert_eq!(app, AppConfig::default());
        assert_eq!(app.geo.similarity_threshold, 0.7);
        assert_eq!(app.engine.max_retries, 2);
        assert_eq!(app.engine.relaxation_order, RelaxStep::default_order());
        assert_eq!(app.embed.backend, EmbedBackend::Ngram);
        Ok(())
    });
}

#[test]
fn env_file_and_env_vars_layer_over_base_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [geo]
            cache_dir = "/var/cache/geo"
            similarity_threshold = 0.8

            [engine]
            relaxation_order = ["facilities", "price"]
            "#,
        )?;
        jail.create_file("config.test.toml", "[engine]\nmax_retries = 1\n")?;
        jail.set_env("APP_GEO__NN_CANDIDATES", "4");

        let cfg = Config::load_for_env("test").map_err(|e| e.to_string())?;
        let app = cfg.app().map_err(|e| e.to_string())?;
        assert_eq!(app.geo.cache_dir, "/var/cache/geo");
        assert_eq!(app.geo.similarity_threshold, 0.8);
        assert_eq!(app.geo.nn_candidates, 4);
        assert_eq!(app.engine.max_retries, 1);
        assert_eq!(app.engine.relaxation_order, vec![RelaxStep::Facilities, RelaxStep::Price]);

        let dim: usize = cfg.get("embed.dim").map_err(|e| e.to_string())?;
        assert_eq!(dim, 256);
        Ok(())
    });
}

#[test]
fn validation_rejects_out_of_range_values() {
    let mut app = AppConfig::default();
    app.geo.similarity_threshold = 0.0;
    assert!(matches!(app.validate(), Err(Error::InvalidConfig(_))));

    let mut app = AppConfig::default();
    app.engine.max_retries = 9;
    assert!(app.validate().is_err());

    let mut app = AppConfig::default();
    app.engine.relaxation_order = vec![RelaxStep::Price, RelaxStep::Price];
    assert!(app.validate().is_err());

    let mut app = AppConfig::default();
    app.geo.similarity_threshold = 1.0;
    assert!(app.validate().is_ok());
}

#[test]
fn resolve_with_base_keeps_absolute_paths() {
    let base = Path::new("/srv/app");
    assert_eq!(resolve_with_base(base, "cache"), Path::new("/srv/app/cache"));
    assert_eq!(resolve_with_base(base, "/tmp/cache"), Path::new("/tmp/cache"));
    assert!(!expand_path("~/x").to_string_lossy().starts_with('~'));
}

#[test]
fn search_filters_read_typed_values_from_state() {
    let mut state = Arc::new(Schema::base()).initial_state();
    let patch = PartialState::new()
        .with(fields::CHECK_IN, "2025-03-01")
        .with(fields::CHECK_OUT, "2025-03-03")
        .with(fields::ADULTS, 2)
        .with(fields::PRICE_MAX, 3000)
        .with(fields::REGION_IDS, json!([7, 3]))
        .with(fields::HAS_BREAKFAST, true);
    state.merge(&patch).expect("merge");

    let filters = SearchFilters::from_state(&state);
    assert_eq!(filters.nights(), Some(2));
    assert_eq!(filters.adults, 2);
    assert_eq!(filters.price_min, None);
    assert_eq!(filters.price_max, Some(3000));
    assert_eq!(filters.region_ids, vec![3, 7]);
    assert!(filters.has_breakfast);
}

#[test]
fn unparseable_dates_read_as_absent() {
    let mut state = Arc::new(Schema::base()).initial_state();
    state.merge(&PartialState::new().with(fields::CHECK_IN, "next friday")).expect("merge");
    assert_eq!(SearchFilters::from_state(&state).check_in, None);
}

#[test]
fn anchor_hotels_come_from_the_first_non_empty_list() {
    let mut schema = Schema::base();
    schema.register(fields::HOTELS, Reducer::keyed("id"), json!([])).expect("register");
    schema.register(fields::PLANS, Reducer::keyed("plan_id"), json!([])).expect("register");
    let mut state = Arc::new(schema).initial_state();
    let plans = json!([
        {"plan_id": "a", "hotel_name": "Harbour Inn"},
        {"plan_id": "b", "hotel_name": "Harbour Inn"},
        {"plan_id": "c", "hotel_id": 9, "hotel_name": "Hill Lodge"},
    ]);
    state.merge(&PartialState::new().with(fields::PLANS, plans)).expect("merge");

    let anchors = SearchFilters::from_state(&state).anchor_hotels;
    assert_eq!(
        anchors,
        vec![
            AnchorHotel { id: json!("Harbour Inn"), name: "Harbour Inn".into() },
            AnchorHotel { id: json!(9), name: "Hill Lodge".into() },
        ]
    );

    let patch = PartialState::new().with(fields::HOTELS, json!([{"id": 1, "name": "Bay"}]));
    state.merge(&patch).expect("merge");
    let anchors = SearchFilters::from_state(&state).anchor_hotels;
    assert_eq!(anchors, vec![AnchorHotel { id: json!(1), name: "Bay".into() }]);
}
