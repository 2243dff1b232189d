//! End-to-end state machine scenarios over the mock gateway

use crate::support::{self, candle, MockGateway};
use perp_momentum::detector::MovementDetector;
use perp_momentum::engine::{HeldGuards, KeyedTryLocks, UserStreamReconciler};
use perp_momentum::entry::EntryEngine;
use perp_momentum::gateway::{OrderSide, PositionUpdate, UserStreamEvent};
use perp_momentum::ladder::{self, TriggerRunner};
use perp_momentum::notify::WebhookNotifier;
use perp_momentum::state::{Position, PositionStatus, TriggerSide};
use rust_decimal_macros::dec;
use std::time::Duration;

/// S3: detector fires, idle accounts arm, the next tick breaches upward
/// and submits a BUY with the protective stop, and the fill completes the
/// transition to open with a built ladder.
#[tokio::test]
async fn test_arm_then_enter_then_open() {
    let config = support::test_config();
    let state = support::fresh_state(&["alpha", "beta"]).await;

    // History of 0.5% moves: average_diff = 0.5, dynamic = 3 × 0.5 = 1.5?
    // Use a pair threshold of 4 on 0.5% candles to land on exactly 2.0%.
    let mut pair = support::btc_pair();
    pair.threshold = dec!(4);
    let detector = MovementDetector::new(pair.clone());

    let history: Vec<_> = (0..10)
        .map(|i| candle(i * 60_000, dec!(1000), dec!(1005)))
        .collect();
    // Closing candle: 96.8 → 100 is a 3.3% move, beating both the 2.0%
    // dynamic threshold and the 2.5% past sum; lock lands on 100.
    let closing = candle(600_000, dec!(96.8), dec!(100));

    let signal = detector.evaluate(&closing, &history).unwrap().unwrap();
    assert_eq!(signal.lock_close_price, dec!(100));
    assert_eq!(signal.dynamic_threshold, dec!(2.0));
    assert_eq!(signal.movement_threshold, dec!(1.0));

    for account in ["alpha", "beta"] {
        let armed = state
            .arm_if_eligible(
                account,
                "BTCUSDT",
                signal.lock_close_price,
                signal.movement_threshold,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(armed.status, PositionStatus::Armed);
        assert_eq!(armed.lock_close_price, Some(dec!(100)));
        assert_eq!(armed.movement_threshold, Some(dec!(1.0)));
    }

    // Tick at 101.01 > 100·1.01 breaches upward
    let entry_locks = KeyedTryLocks::new();
    let entry_guards = HeldGuards::new();
    let entry = EntryEngine::new(state.clone(), entry_locks.clone(), entry_guards.clone());
    let gateway = MockGateway::new();
    entry
        .on_tick(&gateway, "alpha", &pair, dec!(101.01))
        .await
        .unwrap();

    let entries = gateway.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    let (symbol, side, quantity, stop) = &entries[0];
    assert_eq!(symbol, "BTCUSDT");
    assert_eq!(*side, OrderSide::Buy);
    assert_eq!(*quantity, dec!(0.990));
    assert_eq!(*stop, dec!(99.9999));

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position.status, PositionStatus::Entering);
    // The entry lock is still held while the fill is outstanding
    assert!(entry_locks.try_acquire("alpha", "BTCUSDT").is_none());

    // The exchange reports the fill; the reconciler opens the position,
    // builds the ladder from the fill price, and releases the entry lock
    let reconciler = UserStreamReconciler::new(
        "alpha",
        state.clone(),
        config,
        WebhookNotifier::new(),
        support::no_account_logs(),
        entry_guards.clone(),
    );
    reconciler
        .apply(UserStreamEvent::AccountUpdate(vec![PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            position_amount: dec!(0.990),
            entry_price: dec!(101.01),
            position_side: "LONG".to_string(),
        }]))
        .await;

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position.status, PositionStatus::Open);
    assert!(entry_locks.try_acquire("alpha", "BTCUSDT").is_some());
    assert_eq!(position.entry_price, Some(dec!(101.01)));
    assert_eq!(position.trigger_side, Some(TriggerSide::Long));
    assert_eq!(position.triggers.len(), 20);
    assert_eq!(position.stop_prices.len(), 20);

    let expected = ladder::build(dec!(101.01), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    assert_eq!(position.triggers, expected.triggers);
    assert_eq!(position.stop_prices, expected.stop_prices);
}

/// S4: a detector signal does not re-arm an account with an open
/// position; an idle account on the same symbol arms normally.
#[tokio::test]
async fn test_no_rearm_while_open() {
    let state = support::fresh_state(&["alpha", "beta"]).await;

    let open_ladder = ladder::build(dec!(100), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    state
        .update_position("alpha", "BTCUSDT", |p| {
            p.status = PositionStatus::Open;
            p.entry_price = Some(dec!(100));
            p.lock_close_price = Some(dec!(99));
            p.movement_threshold = Some(dec!(1.0));
            p.trigger_side = Some(TriggerSide::Long);
            p.triggers = open_ladder.triggers.clone();
            p.stop_prices = open_ladder.stop_prices.clone();
        })
        .await
        .unwrap();
    let before = state.get_position("alpha", "BTCUSDT").await.unwrap();

    for account in ["alpha", "beta"] {
        let _ = state
            .arm_if_eligible(account, "BTCUSDT", dec!(105), dec!(1.5))
            .await
            .unwrap();
    }

    // Open account untouched
    let alpha = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(alpha, before);

    // Idle account armed
    let beta = state.get_position("beta", "BTCUSDT").await.unwrap();
    assert_eq!(beta.status, PositionStatus::Armed);
    assert_eq!(beta.lock_close_price, Some(dec!(105)));
    assert_eq!(beta.movement_threshold, Some(dec!(1.5)));
}

/// S5: two ticks above the head trigger race one slow gateway call; only
/// one trail stop is placed and only one rung is popped.
#[tokio::test]
async fn test_double_fire_suppression() {
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
    let gateway = MockGateway::with_place_delay(Duration::from_millis(100));

    // Both ticks arrive before the gateway responds to the first
    let (first, second) = tokio::join!(
        runner.on_tick(&gateway, "alpha", "BTCUSDT", dec!(0.505)),
        runner.on_tick(&gateway, "alpha", "BTCUSDT", dec!(0.506)),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(gateway.placed_stops.lock().unwrap().len(), 1);
    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position.triggers.len(), 4);
    assert_eq!(position.triggers[0], dec!(0.510));
}

/// S6: the exchange reports flat mid-ladder; the position returns to
/// fully cleared idle and the remaining ladder is discarded.
#[tokio::test]
async fn test_flat_from_exchange_clears_position() {
    let config = support::test_config();
    let state = support::fresh_state(&["alpha"]).await;

    let rungs = ladder::build(dec!(0.5), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    state
        .update_position("alpha", "BTCUSDT", |p| {
            p.status = PositionStatus::Open;
            p.entry_price = Some(dec!(0.5));
            p.lock_close_price = Some(dec!(0.495));
            p.movement_threshold = Some(dec!(1.0));
            p.trigger_side = Some(TriggerSide::Long);
            // Mid-ladder: some rungs already consumed
            p.triggers = rungs.triggers[7..].to_vec();
            p.stop_prices = rungs.stop_prices[7..].to_vec();
        })
        .await
        .unwrap();

    let reconciler = UserStreamReconciler::new(
        "alpha",
        state.clone(),
        config,
        WebhookNotifier::new(),
        support::no_account_logs(),
        HeldGuards::new(),
    );
    reconciler
        .apply(UserStreamEvent::AccountUpdate(vec![PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            position_amount: dec!(0),
            entry_price: dec!(0),
            position_side: "LONG".to_string(),
        }]))
        .await;

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position, Position::idle());
}

/// Repeated fills for an already-open position must not rebuild or grow
/// the partially consumed ladder.
#[tokio::test]
async fn test_fill_replay_keeps_consumed_ladder() {
    let config = support::test_config();
    let state = support::fresh_state(&["alpha"]).await;

    let rungs = ladder::build(dec!(100), TriggerSide::Long, dec!(1.0), dec!(0.1), 20);
    state
        .update_position("alpha", "BTCUSDT", |p| {
            p.status = PositionStatus::Open;
            p.entry_price = Some(dec!(100));
            p.movement_threshold = Some(dec!(1.0));
            p.trigger_side = Some(TriggerSide::Long);
            p.triggers = rungs.triggers[3..].to_vec();
            p.stop_prices = rungs.stop_prices[3..].to_vec();
        })
        .await
        .unwrap();

    let reconciler = UserStreamReconciler::new(
        "alpha",
        state.clone(),
        config,
        WebhookNotifier::new(),
        support::no_account_logs(),
        HeldGuards::new(),
    );
    reconciler
        .apply(UserStreamEvent::AccountUpdate(vec![PositionUpdate {
            symbol: "BTCUSDT".to_string(),
            position_amount: dec!(1),
            entry_price: dec!(100),
            position_side: "LONG".to_string(),
        }]))
        .await;

    let position = state.get_position("alpha", "BTCUSDT").await.unwrap();
    assert_eq!(position.triggers.len(), 17);
    assert_eq!(position.triggers[0], rungs.triggers[3]);
}
