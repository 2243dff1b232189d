//! Ladder computation and sweep behavior

use crate::support::{self, MockGateway};
use perp_momentum::engine::KeyedTryLocks;
use perp_momentum::ladder::{self, TriggerRunner};
use perp_momentum::state::{PositionStatus, TriggerSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[test]
fn test_long_ladder_worked_example() {
    // E=0.5, m=1.0, f=0.1, N=5
    let rungs = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 5);

    assert_eq!(
        rungs.triggers,
        vec![dec!(0.505), dec!(0.510), dec!(0.515), dec!(0.520), dec!(0.525)]
    );

    // Seed 0.5·(1−0.011) = 0.4945, stops compound by 1.011 and round to 8 dp
    let mut expected = Vec::new();
    let mut stop = dec!(0.4945);
    for _ in 0..5 {
        stop = (stop * dec!(1.011)).round_dp(8);
        expected.push(stop);
    }
    assert_eq!(rungs.stop_prices, expected);
}

#[test]
fn test_rebuild_yields_identical_arrays() {
    let first = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    let second = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    assert_eq!(first.triggers, second.triggers);
    assert_eq!(first.stop_prices, second.stop_prices);
}

#[tokio::test]
async fn test_trigger_sweep_consumes_whole_ladder() {
    let state = support::fresh_state(&["alpha"]).await;
    let rungs = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 5);
    let all_triggers = rungs.triggers.clone();

    state
        .update_position("alpha", "BTCUSDT", |p| {
            p.status = PositionStatus::Open;
            p.entry_price = Some(dec!(0.5));
            p.trigger_side = Some(TriggerSide::Long);
            p.triggers = rungs.triggers.clone();
            p.stop_prices = rungs.stop_prices.clone();
        })
        .await
        .unwrap();

    let runner = TriggerRunner::new(state.clone(), KeyedTryLocks::new());
    let gateway = MockGateway::new();

    let sweep: Vec<Decimal> = vec![
        dec!(0.5),
        dec!(0.502),
        dec!(0.504),
        dec!(0.506),
        dec!(0.508),
        dec!(0.51),
        dec!(0.512),
        dec!(0.514),
        dec!(0.516),
        dec!(0.518),
        dec!(0.52),
        dec!(0.522),
        dec!(0.524),
        dec!(0.526),
    ];

    for price in sweep {
        runner
            .on_tick(&gateway, "alpha", "BTCUSDT", price)
            .await
            .unwrap();

        let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
        // Ladder stays index-aligned at every step
        assert_eq!(position.triggers.len(), position.stop_prices.len());

        let consumed = all_triggers.len() - position.triggers.len();
        for trigger in &all_triggers[..consumed] {
            assert!(*trigger <= price, "consumed trigger {trigger} above price {price}");
        }
        for trigger in &position.triggers {
            assert!(*trigger > price, "remaining trigger {trigger} not above price {price}");
        }
    }

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert!(position.triggers.is_empty());
    assert_eq!(gateway.placed_stops.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_stop_only_popped_after_successful_placement() {
    let state = support::fresh_state(&["alpha"]).await;
    let rungs = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 5);

    state
        .update_position("alpha", "BTCUSDT", |p| {
            p.status = PositionStatus::Open;
            p.entry_price = Some(dec!(0.5));
            p.trigger_side = Some(TriggerSide::Long);
            p.triggers = rungs.triggers.clone();
            p.stop_prices = rungs.stop_prices.clone();
        })
        .await
        .unwrap();

    let runner = TriggerRunner::new(state.clone(), KeyedTryLocks::new());
    let gateway = MockGateway::new();
    // All three attempts fail: the head must survive
    gateway
        .place_failures
        .store(3, std::sync::atomic::Ordering::SeqCst);

    runner
        .on_tick(&gateway, "alpha", "BTCUSDT", dec!(0.505))
        .await
        .unwrap();

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position.triggers.len(), 5);
    assert!(gateway.placed_stops.lock().unwrap().is_empty());
    // Exhausted retries close the position instead
    assert_eq!(gateway.closes.lock().unwrap().as_slice(), ["BTCUSDT"]);
}
