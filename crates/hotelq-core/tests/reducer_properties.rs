use std::sync::Arc;

use hotelq_core::{fields, PartialState, Reducer, Schema};
use proptest::prelude::*;
use serde_json::{json, Value};

fn int_or_null() -> impl Strategy<Value = Value> {
    prop_oneof![Just(Value::Null), (-10_000i64..10_000).prop_map(Value::from)]
}

fn bool_or_null() -> impl Strategy<Value = Value> {
    prop_oneof![Just(Value::Null), any::<bool>().prop_map(Value::from)]
}

fn id_list() -> impl Strategy<Value = Value> {
    prop::collection::vec(0i64..50, 0..6).prop_map(|v| json!(v))
}

fn text() -> impl Strategy<Value = Value> {
    prop::collection::vec("[a-c]{0,3}", 0..4).prop_map(|lines| Value::from(lines.join("\n")))
}

fn records() -> impl Strategy<Value = Value> {
    prop::collection::vec((0i64..6, "[a-z]{1,4}"), 0..5)
        .prop_map(|rows| {
            let rows: Vec<Value> =
                rows.into_iter().map(|(id, n)| json!({"id": id, "name": n})).collect();
            Value::Array(rows)
        })
}

fn filter_patch() -> impl Strategy<Value = PartialState> {
    (int_or_null(), int_or_null(), id_list(), bool_or_null(), 0i64..5).prop_map(
        |(lo, hi, regions, breakfast, adults)| {
            PartialState::new()
                .with(fields::PRICE_MIN, lo)
                .with(fields::PRICE_MAX, hi)
                .with(fields::REGION_IDS, regions)
                .with(fields::HAS_BREAKFAST, breakfast)
                .with(fields::ADULTS, adults)
        },
    )
}

proptest! {
    #[test]
    fn every_reducer_is_idempotent_on_repeat(a in int_or_null(), b in int_or_null(),
                                             la in id_list(), lb in id_list(),
                                             ta in text(), tb in text(),
                                             ra in records(), rb in records()) {
        let cases: Vec<(Reducer, &Value, &Value)> = vec![
            (Reducer::Max, &a, &b),
            (Reducer::Min, &a, &b),
            (Reducer::KeepFirst, &a, &b),
            (Reducer::KeepLast, &a, &b),
            (Reducer::Union, &la, &lb),
            (Reducer::Concat, &ta, &tb),
            (Reducer::keyed("id"), &ra, &rb),
        ];
        for (r, x, y) in cases {
            let once = r.apply(x, y);
            let twice = r.apply(&once, y);
            prop_assert_eq!(&twice, &once, "{} not idempotent", r.name());
        }
    }

    #[test]
    fn commutative_reducers_ignore_argument_order(a in int_or_null(), b in int_or_null(),
                                                  p in bool_or_null(), q in bool_or_null(),
                                                  la in id_list(), lb in id_list()) {
        prop_assert_eq!(Reducer::Max.apply(&a, &b), Reducer::Max.apply(&b, &a));
        prop_assert_eq!(Reducer::Min.apply(&a, &b), Reducer::Min.apply(&b, &a));
        prop_assert_eq!(Reducer::Or.apply(&p, &q), Reducer::Or.apply(&q, &p));
        prop_assert_eq!(Reducer::And.apply(&p, &q), Reducer::And.apply(&q, &p));
        prop_assert_eq!(Reducer::Union.apply(&la, &lb), Reducer::Union.apply(&lb, &la));
    }

    #[test]
    fn keyed_union_never_repeats_a_key(ra in records(), rb in records()) {
        let merged = Reducer::keyed("id").apply(&ra, &rb);
        let ids: Vec<i64> = merged.as_array().into_iter().flatten()
            .filter_map(|r| r.get("id").and_then(Value::as_i64)).collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn merge_order_does_not_matter_for_commutative_fields(
        patches in prop::collection::vec(filter_patch(), 1..5),
    ) {
        let schema = Arc::new(Schema::base());
        let mut forward = schema.initial_state();
        for p in &patches {
            forward.merge(p).unwrap();
        }
        let mut backward = schema.initial_state();
        for p in patches.iter().rev() {
            backward.merge(p).unwrap();
        }
        prop_assert_eq!(forward, backward);
    }
}
