// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use history_tree::{Backend, Config, Error, StateValue};
use rand::seq::SliceRandom;
use rand::{rng, Rng};
use std::time::Duration;

#[test_log::test]
fn full_width_intervals_retrievable_at_every_point() -> history_tree::Result<()> {
    const QUARKS: i32 = 1000;

    let dir = tempfile::tempdir()?;
    let tree = Config::new(dir.path().join("full_width.ht")).create()?;

    for quark in 0..QUARKS {
        tree.insert_past_state(0, 1000, quark, StateValue::Long(i64::from(quark)))?;
    }
    tree.finish_building(1000)?;

    for t in [0, 1, 500, 999, 1000] {
        for quark in 0..QUARKS {
            let interval = tree.query_singular(t, quark)?.expect("interval must exist");
            assert_eq!(interval.value, StateValue::Long(i64::from(quark)));
        }
    }

    Ok(())
}

#[test_log::test]
fn cascading_intervals_cover_every_timestamp() -> history_tree::Result<()> {
    const QUARKS: i64 = 10;
    const LAG: i64 = 10;

    let dir = tempfile::tempdir()?;
    let tree = Config::new(dir.path().join("cascading.ht")).create()?;

    for t in 1..=1010i64 {
        let start = (t - LAG).max(0);
        let end = (t - 1).min(1000);
        if start > end {
            continue;
        }
        let quark = i32::try_from(t % QUARKS).unwrap();
        tree.insert_past_state(start, end, quark, StateValue::Long(t))?;
    }
    tree.finish_building(1000)?;

    for t in (0..=1000i64).step_by(37) {
        for quark in 0..i32::try_from(QUARKS).unwrap() {
            let mut out = vec![None; QUARKS as usize];
            tree.query_full(t, &mut out)?;
            if let Some(interval) = &out[quark as usize] {
                assert!(interval.intersects(t));
            }
        }
    }

    Ok(())
}

#[test_log::test]
fn every_value_variant_round_trips_through_reopen() -> history_tree::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("round_trip.ht");

    let values = vec![
        StateValue::Null,
        StateValue::Boolean(true),
        StateValue::Boolean(false),
        StateValue::Integer(0),
        StateValue::Integer(-1),
        StateValue::Integer(i32::MAX),
        StateValue::Long(i64::MIN),
        StateValue::Double(f64::NAN),
        StateValue::Double(-0.0),
        StateValue::Double(std::f64::consts::PI),
        StateValue::String(String::new()),
        StateValue::String("a".to_string()),
        StateValue::String("x".repeat(1024)),
        StateValue::String("héllo wörld 漢字".to_string()),
    ];

    {
        let tree = Config::new(&path).create()?;
        for (quark, value) in values.iter().enumerate() {
            tree.insert_past_state(0, 100, i32::try_from(quark).unwrap(), value.clone())?;
        }
        tree.finish_building(100)?;
    }

    let tree = Config::new(&path).open()?;
    for (quark, value) in values.iter().enumerate() {
        let stored = tree.query_singular(50, i32::try_from(quark).unwrap())?.expect("interval must exist");
        match (value, &stored.value) {
            (StateValue::Double(a), StateValue::Double(b)) if a.is_nan() => assert!(b.is_nan()),
            _ => assert_eq!(*value, stored.value),
        }
    }

    Ok(())
}

#[test_log::test]
fn reopen_with_matching_and_mismatched_provider_version() -> history_tree::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reopen.ht");

    {
        let tree = Config::new(&path).provider_version(7).create()?;
        tree.insert_past_state(0, 10, 0, StateValue::Integer(42))?;
        tree.finish_building(10)?;
    }

    let reopened = Config::new(&path).provider_version(7).open()?;
    assert_eq!(reopened.query_singular(5, 0)?.unwrap().value, StateValue::Integer(42));

    let mismatched = Config::new(&path).provider_version(8).open();
    assert!(matches!(mismatched, Err(Error::Corruption(_))));

    Ok(())
}

#[test_log::test]
fn threaded_backend_matches_synchronous_backend() -> history_tree::Result<()> {
    let dir = tempfile::tempdir()?;

    let sync_backend = Config::new(dir.path().join("sync.ht")).create_backend(1)?;
    let threaded_backend = Config::new(dir.path().join("threaded.ht")).queue_size(32).create_threaded_backend(1)?;

    for quark in 0..50i32 {
        let value = StateValue::Long(i64::from(quark) * 2);
        sync_backend.insert_past_state(0, 500, quark, value.clone())?;
        threaded_backend.insert_past_state(0, 500, quark, value)?;
    }
    sync_backend.finish_building(500)?;
    threaded_backend.finish_building(500)?;
    assert!(threaded_backend.wait_until_built(Duration::from_secs(5)));

    for quark in 0..50i32 {
        assert_eq!(
            sync_backend.do_singular_query(250, quark)?,
            threaded_backend.do_singular_query(250, quark)?
        );
    }

    Ok(())
}

#[test_log::test]
fn query_outside_tree_range_fails() -> history_tree::Result<()> {
    let dir = tempfile::tempdir()?;
    let tree = Config::new(dir.path().join("boundary.ht")).start_time(100).create()?;

    tree.insert_past_state(100, 200, 0, StateValue::Boolean(true))?;
    tree.finish_building(200)?;

    assert!(tree.query_singular(100, 0).is_ok());
    assert!(tree.query_singular(200, 0).is_ok());
    assert!(matches!(tree.query_singular(99, 0), Err(Error::TimeRangeError { .. })));
    assert!(matches!(tree.query_singular(201, 0), Err(Error::TimeRangeError { .. })));

    Ok(())
}

#[test_log::test]
fn random_insertion_order_does_not_affect_query_results() -> history_tree::Result<()> {
    const QUARKS: i32 = 300;

    let mut gen = rng();
    let mut expected = Vec::with_capacity(QUARKS as usize);
    for _ in 0..QUARKS {
        expected.push(StateValue::Long(gen.random()));
    }

    let mut order: Vec<i32> = (0..QUARKS).collect();
    order.shuffle(&mut gen);

    let dir = tempfile::tempdir()?;
    let tree = Config::new(dir.path().join("shuffled.ht")).create()?;

    for quark in order {
        tree.insert_past_state(0, 1000, quark, expected[quark as usize].clone())?;
    }
    tree.finish_building(1000)?;

    for quark in 0..QUARKS {
        let interval = tree.query_singular(500, quark)?.expect("interval must exist");
        assert_eq!(interval.value, expected[quark as usize]);
    }

    Ok(())
}
