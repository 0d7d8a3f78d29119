//--------------------------------------------------------------------------------------------------
// TEST MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Integration scenarios for the matching core, driven through a recording execution handler.
// Each scenario feeds literal top-of-book values (price precision 2, raw = decimal x 100) and
// asserts exactly which callbacks fire and what state they leave on the order.
//--------------------------------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use tickcross::{
    ExecutionHandler, Instrument, LiquiditySide, MatchingCore, Order, OrderRef, OrderStatus,
    OrderType, Price, Side,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callback {
    Trigger,
    FillMarket,
    FillLimit,
}

type CallLog = Rc<RefCell<Vec<(Callback, Uuid)>>>;

/// Execution handler that records every callback and applies the canonical
/// order effects (activation on trigger, completion on fill). Optionally
/// cancels a victim order on the first limit fill, to exercise mid-sweep
/// mutation.
struct RecordingHandler {
    calls: CallLog,
    cancel_on_first_limit_fill: Option<OrderRef>,
}

impl RecordingHandler {
    fn new(calls: CallLog) -> Self {
        Self {
            calls,
            cancel_on_first_limit_fill: None,
        }
    }
}

impl ExecutionHandler for RecordingHandler {
    fn trigger_stop_order(&mut self, order: &OrderRef) {
        self.calls
            .borrow_mut()
            .push((Callback::Trigger, order.borrow().id));
        order.borrow_mut().mark_triggered();
    }

    fn fill_market_order(&mut self, order: &OrderRef) {
        self.calls
            .borrow_mut()
            .push((Callback::FillMarket, order.borrow().id));
        order.borrow_mut().mark_filled();
    }

    fn fill_limit_order(&mut self, order: &OrderRef) {
        self.calls
            .borrow_mut()
            .push((Callback::FillLimit, order.borrow().id));
        order.borrow_mut().mark_filled();
        if let Some(victim) = self.cancel_on_first_limit_fill.take() {
            victim.borrow_mut().mark_cancelled();
        }
    }
}

fn instrument() -> Instrument {
    Instrument::new(Uuid::new_v4(), "BTC-PERP", 2)
}

fn recording_core(instrument: &Instrument) -> (MatchingCore, CallLog) {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let core = MatchingCore::new(
        instrument.clone(),
        Box::new(RecordingHandler::new(calls.clone())),
    );
    (core, calls)
}

fn order(
    instrument: &Instrument,
    side: Side,
    order_type: OrderType,
    limit_raw: Option<i64>,
    trigger_raw: Option<i64>,
) -> OrderRef {
    Order::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        instrument.id,
        side,
        order_type,
        limit_raw.map(|raw| Price::new(raw, instrument.price_precision)),
        trigger_raw.map(|raw| Price::new(raw, instrument.price_precision)),
        100_000,
    )
    .unwrap()
    .into_ref()
}

fn calls_for(calls: &CallLog, id: Uuid) -> Vec<Callback> {
    calls
        .borrow()
        .iter()
        .filter(|(_, order_id)| *order_id == id)
        .map(|(callback, _)| *callback)
        .collect()
}

#[test]
fn limit_buy_fills_as_maker_on_arrival() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10000);

    let o = order(&instrument, Side::Buy, OrderType::Limit, Some(10050), None);
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.match_order(&o, true).unwrap();

    assert_eq!(calls_for(&calls, id), vec![Callback::FillLimit]);
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Maker));
}

#[test]
fn stop_market_buy_triggers_when_ask_lifts() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(9900);

    let o = order(&instrument, Side::Buy, OrderType::StopMarket, None, Some(10000));
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();

    // Ask below the trigger: nothing happens.
    core.iterate(1).unwrap();
    assert!(calls.borrow().is_empty());
    assert!(o.borrow().triggered_price.is_none());

    // Ask reaches the trigger: one market fill, trigger price recorded.
    core.set_ask_raw(10000);
    core.iterate(2).unwrap();
    assert_eq!(calls_for(&calls, id), vec![Callback::FillMarket]);
    assert_eq!(o.borrow().triggered_price, Some(Price::new(10000, 2)));
    assert_eq!(core.ts_last(), 2);
}

#[test]
fn market_if_touched_buy_fires_when_ask_falls() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10100);

    let o = order(&instrument, Side::Buy, OrderType::MarketIfTouched, None, Some(10000));
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();

    // Ask above the touch level: nothing. The mirror of a stop.
    core.iterate(1).unwrap();
    assert!(calls.borrow().is_empty());

    core.set_ask_raw(10000);
    core.iterate(2).unwrap();
    assert_eq!(calls_for(&calls, id), vec![Callback::FillMarket]);
    assert_eq!(o.borrow().triggered_price, Some(Price::new(10000, 2)));
}

#[test]
fn stop_limit_buy_immediately_marketable_on_trigger() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_bid_raw(10090);
    core.set_ask_raw(10100);

    let o = order(
        &instrument,
        Side::Buy,
        OrderType::StopLimit,
        Some(10200),
        Some(10050),
    );
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.match_order(&o, false).unwrap();

    // The trigger carried the order through its own limit: trigger then fill,
    // with the fill overwriting the liquidity side to taker.
    assert_eq!(
        calls_for(&calls, id),
        vec![Callback::Trigger, Callback::FillLimit]
    );
    assert!(o.borrow().is_triggered);
    assert_eq!(o.borrow().triggered_price, Some(Price::new(10050, 2)));
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Taker));
}

#[test]
fn stop_limit_buy_rests_as_maker_after_trigger() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10050);

    // Trigger above the limit: activates passively, not yet marketable.
    let o = order(
        &instrument,
        Side::Buy,
        OrderType::StopLimit,
        Some(10000),
        Some(10050),
    );
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.iterate(1).unwrap();

    assert_eq!(calls_for(&calls, id), vec![Callback::Trigger]);
    assert!(o.borrow().is_triggered);
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Maker));
    assert!(!o.borrow().is_closed());

    // Ask keeps falling to the limit: the activated order fills as a maker.
    core.set_ask_raw(10000);
    core.iterate(2).unwrap();
    assert_eq!(
        calls_for(&calls, id),
        vec![Callback::Trigger, Callback::FillLimit]
    );
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Maker));
    assert_eq!(o.borrow().status, OrderStatus::Filled);
}

#[test]
fn limit_if_touched_initial_sweep_skips_triggered_price() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10000);

    let o = order(
        &instrument,
        Side::Buy,
        OrderType::LimitIfTouched,
        Some(9950),
        Some(10050),
    );
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.match_order(&o, true).unwrap();

    // Touch held on arrival: the order activates, but the triggered price is
    // left unset for the caller, and 99.50 is not yet marketable.
    assert_eq!(calls_for(&calls, id), vec![Callback::Trigger]);
    assert!(o.borrow().is_triggered);
    assert!(o.borrow().triggered_price.is_none());
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Taker));
}

#[test]
fn limit_if_touched_non_initial_records_triggered_price() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10000);

    let o = order(
        &instrument,
        Side::Buy,
        OrderType::LimitIfTouched,
        Some(9950),
        Some(10050),
    );
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.match_order(&o, false).unwrap();

    assert_eq!(calls_for(&calls, id), vec![Callback::Trigger]);
    assert_eq!(o.borrow().triggered_price, Some(Price::new(10050, 2)));
    // Passive configuration: the limit sits below the trigger.
    assert_eq!(o.borrow().liquidity_side, Some(LiquiditySide::Maker));
}

#[test]
fn iterate_sweeps_bids_before_asks_in_priority_order() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_bid_raw(10100);
    core.set_ask_raw(9900);

    // Everything is marketable; the callback order exposes the sweep order.
    let low_bid = order(&instrument, Side::Buy, OrderType::Limit, Some(10000), None);
    let high_bid = order(&instrument, Side::Buy, OrderType::Limit, Some(10050), None);
    let high_ask = order(&instrument, Side::Sell, OrderType::Limit, Some(10050), None);
    let low_ask = order(&instrument, Side::Sell, OrderType::Limit, Some(10000), None);

    core.add_order(low_bid.clone()).unwrap();
    core.add_order(high_bid.clone()).unwrap();
    core.add_order(high_ask.clone()).unwrap();
    core.add_order(low_ask.clone()).unwrap();

    core.iterate(1).unwrap();

    let ids: Vec<Uuid> = calls.borrow().iter().map(|(_, id)| *id).collect();
    assert_eq!(
        ids,
        vec![
            high_bid.borrow().id,
            low_bid.borrow().id,
            low_ask.borrow().id,
            high_ask.borrow().id,
        ]
    );
}

#[test]
fn orders_closed_mid_sweep_are_skipped() {
    let instrument = instrument();
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));

    let o1 = order(&instrument, Side::Buy, OrderType::Limit, Some(10050), None);
    let o2 = order(&instrument, Side::Buy, OrderType::Limit, Some(10000), None);

    // The first limit fill cancels o2 through its shared handle.
    let mut handler = RecordingHandler::new(calls.clone());
    handler.cancel_on_first_limit_fill = Some(o2.clone());
    let mut core = MatchingCore::new(instrument.clone(), Box::new(handler));

    core.set_ask_raw(9900);
    core.add_order(o1.clone()).unwrap();
    core.add_order(o2.clone()).unwrap();

    // Both are marketable, but o2 is closed by o1's fill before the sweep
    // reaches it.
    core.iterate(1).unwrap();

    assert_eq!(calls_for(&calls, o1.borrow().id), vec![Callback::FillLimit]);
    assert!(calls_for(&calls, o2.borrow().id).is_empty());
    assert_eq!(o2.borrow().status, OrderStatus::Cancelled);

    // The canonical lists still hold o2 until the owner deletes it.
    assert!(core.order_exists(o2.borrow().id));
    core.delete_order(o2.borrow().id);
    assert!(!core.order_exists(o2.borrow().id));
}

#[test]
fn no_market_means_no_callbacks() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);

    let o = order(&instrument, Side::Buy, OrderType::Limit, Some(10050), None);
    core.add_order(o.clone()).unwrap();
    core.match_order(&o, true).unwrap();
    core.iterate(1).unwrap();

    assert!(calls.borrow().is_empty());
    assert!(!core.is_limit_matched(Side::Buy, Price::new(i64::MAX, 2)));
}

#[test]
fn sell_side_mirrors_buy_side_behavior() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_bid_raw(10000);

    // Sell stop fires when the bid falls to the trigger.
    let stop = order(&instrument, Side::Sell, OrderType::StopMarket, None, Some(10000));
    let stop_id = stop.borrow().id;
    core.add_order(stop.clone()).unwrap();
    core.iterate(1).unwrap();
    assert_eq!(calls_for(&calls, stop_id), vec![Callback::FillMarket]);

    // Sell limit fills as maker when the bid rises to it.
    let limit = order(&instrument, Side::Sell, OrderType::Limit, Some(10100), None);
    let limit_id = limit.borrow().id;
    core.add_order(limit.clone()).unwrap();
    core.iterate(2).unwrap();
    assert!(calls_for(&calls, limit_id).is_empty());

    core.set_bid_raw(10100);
    core.iterate(3).unwrap();
    assert_eq!(calls_for(&calls, limit_id), vec![Callback::FillLimit]);
    assert_eq!(limit.borrow().liquidity_side, Some(LiquiditySide::Maker));
}

#[test]
fn trailing_variants_share_their_family_behavior() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10100);

    let trailing_stop = order(
        &instrument,
        Side::Buy,
        OrderType::TrailingStopMarket,
        None,
        Some(10050),
    );
    let trailing_stop_limit = order(
        &instrument,
        Side::Buy,
        OrderType::TrailingStopLimit,
        Some(10200),
        Some(10050),
    );
    let ts_id = trailing_stop.borrow().id;
    let tsl_id = trailing_stop_limit.borrow().id;

    core.add_order(trailing_stop.clone()).unwrap();
    core.add_order(trailing_stop_limit.clone()).unwrap();
    core.iterate(1).unwrap();

    assert_eq!(calls_for(&calls, ts_id), vec![Callback::FillMarket]);
    assert_eq!(
        calls_for(&calls, tsl_id),
        vec![Callback::Trigger, Callback::FillLimit]
    );
}

#[test]
fn update_order_requeues_at_new_priority() {
    let instrument = instrument();
    let (mut core, calls) = recording_core(&instrument);
    core.set_ask_raw(10000);

    // Resting above the market: no fill.
    let o = order(&instrument, Side::Buy, OrderType::Limit, Some(9900), None);
    let id = o.borrow().id;
    core.add_order(o.clone()).unwrap();
    core.iterate(1).unwrap();
    assert!(calls.borrow().is_empty());

    // Amending the limit through the ask makes the next sweep fill it.
    assert!(core.update_order(id, Some(Price::new(10000, 2)), None));
    core.iterate(2).unwrap();
    assert_eq!(calls_for(&calls, id), vec![Callback::FillLimit]);
}
