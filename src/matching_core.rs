//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Per-instrument matching core. Consumes top-of-book and last-trade prices, keeps the working
// set of conditional and resting orders in priority order, and decides when each order type
// triggers or fills. Effects are delegated to an injected ExecutionHandler; the core itself
// knows nothing about venues, accounts, or positions.
//
// | Component        | Description                                                        |
// |------------------|--------------------------------------------------------------------|
// | MatchingCore     | Price state, order index, bid/ask priority lists, sweep protocol   |
// | order_sort_key   | Maps an order to its priority integer                              |
// | Predicates       | is_limit_matched / is_stop_triggered / is_touch_triggered          |
// | Matchers         | One routine per order-type family, dispatched by match_order       |
// | MatchingError    | Programming-error class failures (invalid type, wrong instrument)  |
//
//--------------------------------------------------------------------------------------------------
// PRIORITY ORDER
//--------------------------------------------------------------------------------------------------
// | order_type                                      | key                                      |
// |-------------------------------------------------|------------------------------------------|
// | Limit, MarketToLimit                            | limit_price.raw                          |
// | StopMarket, MarketIfTouched, TrailingStopMarket | trigger_price.raw                        |
// | StopLimit, LimitIfTouched, TrailingStopLimit    | limit_price.raw once triggered,          |
// |                                                 | trigger_price.raw before                 |
//
// Bids sort descending (most aggressive first), asks ascending.
//--------------------------------------------------------------------------------------------------

use std::cmp::Reverse;
use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{Event, EventBus};
use crate::handlers::ExecutionHandler;
use crate::types::{Instrument, LiquiditySide, Order, OrderRef, OrderType, Price, Side};

/// Errors raised by the matching core.
///
/// Both variants signal a bug in the caller or in upstream deserialization, not
/// a runtime market condition; no state is mutated when they are returned.
/// "Nothing matched" and "no market yet" are normal returns, never errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// The order type cannot be handled at this point (market orders never rest).
    #[error("order type {0:?} is not valid for the matching core")]
    InvalidOrderType(OrderType),

    /// The order belongs to a different instrument than the core manages.
    #[error("order instrument {order} does not match core instrument {core}")]
    WrongInstrument { core: Uuid, order: Uuid },
}

/// Type alias for Result with MatchingError.
pub type MatchingResult<T> = Result<T, MatchingError>;

/// Maps an order to the integer that positions it in its side's priority list.
///
/// Untriggered conditional limit orders queue at their trigger price and move to
/// their limit price once activated.
///
/// # Panics
///
/// Panics for [`OrderType::Market`]: market orders carry no book priority and
/// are rejected by [`MatchingCore::add_order`] before they can reach a sort.
pub fn order_sort_key(order: &Order) -> i64 {
    match order.order_type {
        OrderType::Limit | OrderType::MarketToLimit => {
            order.limit_price.expect("limit-bearing order without limit price").raw
        }
        OrderType::StopMarket | OrderType::MarketIfTouched | OrderType::TrailingStopMarket => {
            order
                .trigger_price
                .expect("trigger-bearing order without trigger price")
                .raw
        }
        OrderType::StopLimit | OrderType::LimitIfTouched | OrderType::TrailingStopLimit => {
            if order.is_triggered {
                order.limit_price.expect("limit-bearing order without limit price").raw
            } else {
                order
                    .trigger_price
                    .expect("trigger-bearing order without trigger price")
                    .raw
            }
        }
        OrderType::Market => panic!("market orders have no priority key"),
    }
}

/// Liquidity side assigned to a conditional limit order at the instant it triggers.
///
/// An order already in range on its initial sweep crosses on arrival. Otherwise
/// the order is a maker when its limit sits passively through the trigger (a buy
/// whose limit is below its trigger, a sell whose limit is above), and a taker
/// in every other configuration.
fn liquidity_side_on_trigger(
    initial: bool,
    side: Side,
    limit_price: Price,
    trigger_price: Price,
) -> LiquiditySide {
    if initial {
        return LiquiditySide::Taker;
    }
    match side {
        Side::Buy if trigger_price.raw > limit_price.raw => LiquiditySide::Maker,
        Side::Sell if trigger_price.raw < limit_price.raw => LiquiditySide::Maker,
        _ => LiquiditySide::Taker,
    }
}

/// The matching core for a single instrument.
///
/// Owns the three market-price slots (bid/ask/last, each with an initialized
/// flag so that a never-published price is distinguishable from a literal
/// zero), the index of working orders, and the two priority-sorted side lists.
/// Orders are shared handles: the external owner and the execution handler both
/// see the mutations the core applies.
///
/// A core instance is single-owner and must be driven from one thread; separate
/// instruments get separate instances and share nothing.
pub struct MatchingCore {
    instrument: Instrument,
    bid_raw: i64,
    ask_raw: i64,
    last_raw: i64,
    is_bid_initialized: bool,
    is_ask_initialized: bool,
    is_last_initialized: bool,
    orders: HashMap<Uuid, OrderRef>,
    orders_bid: Vec<OrderRef>,
    orders_ask: Vec<OrderRef>,
    handler: Box<dyn ExecutionHandler>,
    event_bus: Option<EventBus>,
    ts_last_ns: u64,
}

impl MatchingCore {
    /// Creates a matching core for `instrument`, delegating effects to `handler`.
    pub fn new(instrument: Instrument, handler: Box<dyn ExecutionHandler>) -> Self {
        Self {
            instrument,
            bid_raw: 0,
            ask_raw: 0,
            last_raw: 0,
            is_bid_initialized: false,
            is_ask_initialized: false,
            is_last_initialized: false,
            orders: HashMap::new(),
            orders_bid: Vec::new(),
            orders_ask: Vec::new(),
            handler,
            event_bus: None,
            ts_last_ns: 0,
        }
    }

    /// Creates a matching core that additionally publishes lifecycle events.
    pub fn with_event_bus(
        instrument: Instrument,
        handler: Box<dyn ExecutionHandler>,
        event_bus: EventBus,
    ) -> Self {
        let mut core = Self::new(instrument, handler);
        core.event_bus = Some(event_bus);
        core
    }

    //----------------------------------------------------------------------------------------------
    //  QUERIES
    //----------------------------------------------------------------------------------------------

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn price_precision(&self) -> u8 {
        self.instrument.price_precision
    }

    /// Best bid, or `None` before the first bid update.
    pub fn bid(&self) -> Option<Price> {
        self.is_bid_initialized
            .then(|| Price::new(self.bid_raw, self.instrument.price_precision))
    }

    /// Best ask, or `None` before the first ask update.
    pub fn ask(&self) -> Option<Price> {
        self.is_ask_initialized
            .then(|| Price::new(self.ask_raw, self.instrument.price_precision))
    }

    /// Last traded price, or `None` before the first trade update.
    pub fn last(&self) -> Option<Price> {
        self.is_last_initialized
            .then(|| Price::new(self.last_raw, self.instrument.price_precision))
    }

    /// Timestamp passed to the most recent [`iterate`](Self::iterate) call.
    /// Handler implementations can query it while processing effects.
    pub fn ts_last(&self) -> u64 {
        self.ts_last_ns
    }

    pub fn get_order(&self, client_order_id: Uuid) -> Option<OrderRef> {
        self.orders.get(&client_order_id).cloned()
    }

    pub fn order_exists(&self, client_order_id: Uuid) -> bool {
        self.orders.contains_key(&client_order_id)
    }

    /// All working orders, bids first then asks. Each side is in priority order;
    /// the concatenation is not globally sorted.
    pub fn get_orders(&self) -> Vec<OrderRef> {
        let mut orders = self.orders_bid.clone();
        orders.extend_from_slice(&self.orders_ask);
        orders
    }

    pub fn get_orders_bid(&self) -> &[OrderRef] {
        &self.orders_bid
    }

    pub fn get_orders_ask(&self) -> &[OrderRef] {
        &self.orders_ask
    }

    //----------------------------------------------------------------------------------------------
    //  COMMANDS
    //----------------------------------------------------------------------------------------------

    /// Stores a new best bid. The value is taken as-is; no validation.
    #[inline]
    pub fn set_bid_raw(&mut self, bid_raw: i64) {
        self.bid_raw = bid_raw;
        self.is_bid_initialized = true;
    }

    /// Stores a new best ask. The value is taken as-is; no validation.
    #[inline]
    pub fn set_ask_raw(&mut self, ask_raw: i64) {
        self.ask_raw = ask_raw;
        self.is_ask_initialized = true;
    }

    /// Stores a new last-traded price. The value is taken as-is; no validation.
    #[inline]
    pub fn set_last_raw(&mut self, last_raw: i64) {
        self.last_raw = last_raw;
        self.is_last_initialized = true;
    }

    /// Returns the core to its pre-market state: prices uninitialized, no
    /// working orders.
    pub fn reset(&mut self) {
        self.bid_raw = 0;
        self.ask_raw = 0;
        self.last_raw = 0;
        self.is_bid_initialized = false;
        self.is_ask_initialized = false;
        self.is_last_initialized = false;
        self.orders.clear();
        self.orders_bid.clear();
        self.orders_ask.clear();
        info!(instrument = %self.instrument.symbol, "matching core reset");
    }

    /// Registers a working order and slots it into its side's priority list.
    ///
    /// # Errors
    ///
    /// Rejects orders for another instrument (`WrongInstrument`) and market
    /// orders (`InvalidOrderType`), in both cases before any state mutation.
    pub fn add_order(&mut self, order: OrderRef) -> MatchingResult<()> {
        let (id, side, order_type, instrument_id) = {
            let o = order.borrow();
            (o.id, o.side, o.order_type, o.instrument_id)
        };

        if instrument_id != self.instrument.id {
            return Err(MatchingError::WrongInstrument {
                core: self.instrument.id,
                order: instrument_id,
            });
        }
        if order_type == OrderType::Market {
            return Err(MatchingError::InvalidOrderType(order_type));
        }
        debug_assert!(
            !self.orders.contains_key(&id),
            "duplicate client order id {id}"
        );

        self.orders.insert(id, order.clone());
        match side {
            Side::Buy => {
                self.orders_bid.push(order);
                self.sort_bids();
            }
            Side::Sell => {
                self.orders_ask.push(order);
                self.sort_asks();
            }
        }

        debug!(order_id = %id, ?side, ?order_type, "order added");
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::OrderAdded {
                order_id: id,
                instrument_id,
                side,
            });
        }
        Ok(())
    }

    /// Removes a working order. Unknown ids are a no-op; calling twice has the
    /// same effect as calling once.
    pub fn delete_order(&mut self, client_order_id: Uuid) {
        if self.orders.remove(&client_order_id).is_none() {
            debug!(order_id = %client_order_id, "delete for unknown order");
            return;
        }
        self.orders_bid.retain(|o| o.borrow().id != client_order_id);
        self.orders_ask.retain(|o| o.borrow().id != client_order_id);

        debug!(order_id = %client_order_id, "order deleted");
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::OrderDeleted {
                order_id: client_order_id,
                instrument_id: self.instrument.id,
            });
        }
    }

    /// Replaces the price fields of a working order and re-sorts its side, so
    /// the order re-enters the next sweep at its new priority.
    ///
    /// Returns `false` (without touching anything) when the id is unknown.
    pub fn update_order(
        &mut self,
        client_order_id: Uuid,
        limit_price: Option<Price>,
        trigger_price: Option<Price>,
    ) -> bool {
        let Some(order) = self.orders.get(&client_order_id) else {
            return false;
        };

        let side = {
            let mut o = order.borrow_mut();
            if let Some(price) = limit_price {
                o.limit_price = Some(price);
            }
            if let Some(price) = trigger_price {
                o.trigger_price = Some(price);
            }
            o.updated_at = chrono::Utc::now();
            o.side
        };

        match side {
            Side::Buy => self.sort_bids(),
            Side::Sell => self.sort_asks(),
        }
        debug!(order_id = %client_order_id, "order updated");
        true
    }

    fn sort_bids(&mut self) {
        self.orders_bid
            .sort_by_key(|o| Reverse(order_sort_key(&o.borrow())));
    }

    fn sort_asks(&mut self) {
        self.orders_ask.sort_by_key(|o| order_sort_key(&o.borrow()));
    }

    //----------------------------------------------------------------------------------------------
    //  ITERATION
    //----------------------------------------------------------------------------------------------

    /// Sweeps every working order against the current market: bids in
    /// descending priority, then asks in ascending priority.
    ///
    /// The sweep runs over a snapshot of the side lists taken at entry, so
    /// orders added by handler callbacks wait for the next sweep and orders
    /// closed mid-sweep are skipped by the `is_closed` check. `ts_ns` is
    /// recorded for handlers; the core itself never consults a clock.
    pub fn iterate(&mut self, ts_ns: u64) -> MatchingResult<()> {
        self.ts_last_ns = ts_ns;

        let snapshot: Vec<OrderRef> = self
            .orders_bid
            .iter()
            .chain(self.orders_ask.iter())
            .cloned()
            .collect();

        for order in &snapshot {
            if order.borrow().is_closed() {
                continue;
            }
            self.match_order(order, false)?;
        }
        Ok(())
    }

    //----------------------------------------------------------------------------------------------
    //  MATCHING
    //----------------------------------------------------------------------------------------------

    /// Runs the matching routine for the order's type against the current
    /// market. `initial` marks the first evaluation of a newly arrived order,
    /// which changes how conditional limit orders assign liquidity and record
    /// their triggered price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrderType` for market orders, which have no matching
    /// routine here.
    pub fn match_order(&mut self, order: &OrderRef, initial: bool) -> MatchingResult<()> {
        let order_type = order.borrow().order_type;
        match order_type {
            OrderType::Limit | OrderType::MarketToLimit => self.match_limit_order(order),
            OrderType::StopMarket | OrderType::TrailingStopMarket => {
                self.match_stop_market_order(order);
            }
            OrderType::StopLimit | OrderType::TrailingStopLimit => {
                self.match_stop_limit_order(order, initial);
            }
            OrderType::MarketIfTouched => self.match_market_if_touched_order(order),
            OrderType::LimitIfTouched => self.match_limit_if_touched_order(order, initial),
            OrderType::Market => return Err(MatchingError::InvalidOrderType(order_type)),
        }
        Ok(())
    }

    fn match_limit_order(&mut self, order: &OrderRef) {
        let (side, limit_price) = {
            let o = order.borrow();
            (o.side, o.limit_price.expect("limit order without limit price"))
        };
        if self.is_limit_matched(side, limit_price) {
            order.borrow_mut().set_liquidity_side(LiquiditySide::Maker);
            self.handler.fill_limit_order(order);
        }
    }

    fn match_stop_market_order(&mut self, order: &OrderRef) {
        let (side, trigger_price) = {
            let o = order.borrow();
            (o.side, o.trigger_price.expect("stop order without trigger price"))
        };
        if self.is_stop_triggered(side, trigger_price) {
            order.borrow_mut().set_triggered_price(trigger_price);
            self.handler.fill_market_order(order);
        }
    }

    fn match_stop_limit_order(&mut self, order: &OrderRef, initial: bool) {
        let (side, limit_price, trigger_price, is_triggered) = {
            let o = order.borrow();
            (
                o.side,
                o.limit_price.expect("stop-limit order without limit price"),
                o.trigger_price.expect("stop-limit order without trigger price"),
                o.is_triggered,
            )
        };

        if is_triggered {
            if self.is_limit_matched(side, limit_price) {
                order.borrow_mut().set_liquidity_side(LiquiditySide::Maker);
                self.handler.fill_limit_order(order);
            }
            return;
        }

        if self.is_stop_triggered(side, trigger_price) {
            {
                let mut o = order.borrow_mut();
                o.set_triggered_price(trigger_price);
                o.set_liquidity_side(liquidity_side_on_trigger(
                    initial,
                    side,
                    limit_price,
                    trigger_price,
                ));
            }
            self.handler.trigger_stop_order(order);

            // The trigger may carry the order straight through its own limit.
            if self.is_limit_matched(side, limit_price) {
                order.borrow_mut().set_liquidity_side(LiquiditySide::Taker);
                self.handler.fill_limit_order(order);
            }
        }
    }

    fn match_market_if_touched_order(&mut self, order: &OrderRef) {
        let (side, trigger_price) = {
            let o = order.borrow();
            (o.side, o.trigger_price.expect("if-touched order without trigger price"))
        };
        if self.is_touch_triggered(side, trigger_price) {
            order.borrow_mut().set_triggered_price(trigger_price);
            self.handler.fill_market_order(order);
        }
    }

    fn match_limit_if_touched_order(&mut self, order: &OrderRef, initial: bool) {
        let (side, limit_price, trigger_price, is_triggered) = {
            let o = order.borrow();
            (
                o.side,
                o.limit_price.expect("limit-if-touched order without limit price"),
                o.trigger_price.expect("limit-if-touched order without trigger price"),
                o.is_triggered,
            )
        };

        if is_triggered {
            if self.is_limit_matched(side, limit_price) {
                order.borrow_mut().set_liquidity_side(LiquiditySide::Maker);
                self.handler.fill_limit_order(order);
            }
            return;
        }

        if self.is_touch_triggered(side, trigger_price) {
            {
                let mut o = order.borrow_mut();
                // On the initial sweep the touch condition may already hold
                // against pre-existing state; the triggered price is left for
                // the caller to fix externally.
                if !initial {
                    o.set_triggered_price(trigger_price);
                }
                o.set_liquidity_side(liquidity_side_on_trigger(
                    initial,
                    side,
                    limit_price,
                    trigger_price,
                ));
            }
            self.handler.trigger_stop_order(order);

            if self.is_limit_matched(side, limit_price) {
                order.borrow_mut().set_liquidity_side(LiquiditySide::Taker);
                self.handler.fill_limit_order(order);
            }
        }
    }

    //----------------------------------------------------------------------------------------------
    //  PREDICATES
    //----------------------------------------------------------------------------------------------

    /// Whether a limit order at `price` is marketable against the opposite
    /// side. Always `false` while that side is uninitialized.
    #[inline]
    #[must_use]
    pub fn is_limit_matched(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self.is_ask_initialized && self.ask_raw <= price.raw,
            Side::Sell => self.is_bid_initialized && self.bid_raw >= price.raw,
        }
    }

    /// Whether a stop at `trigger_price` has been traded through: a buy stop
    /// fires when the market rises into it, a sell stop when it falls into it.
    /// Always `false` while the relevant side is uninitialized.
    #[inline]
    #[must_use]
    pub fn is_stop_triggered(&self, side: Side, trigger_price: Price) -> bool {
        match side {
            Side::Buy => self.is_ask_initialized && self.ask_raw >= trigger_price.raw,
            Side::Sell => self.is_bid_initialized && self.bid_raw <= trigger_price.raw,
        }
    }

    /// Whether an if-touched trigger has been reached: the mirror of a stop.
    /// A buy if-touched fires when the market falls to the trigger. Always
    /// `false` while the relevant side is uninitialized.
    #[inline]
    #[must_use]
    pub fn is_touch_triggered(&self, side: Side, trigger_price: Price) -> bool {
        match side {
            Side::Buy => self.is_ask_initialized && self.ask_raw <= trigger_price.raw,
            Side::Sell => self.is_bid_initialized && self.bid_raw >= trigger_price.raw,
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
// | Name                                   | Description                                       |
// |----------------------------------------|---------------------------------------------------|
// | test_add_order_partitions_by_side      | Orders land in the list matching their side.      |
// | test_side_lists_stay_sorted            | Bid descending / ask ascending after every add.   |
// | test_sort_key_table                    | Priority key per order type, incl. trigger switch.|
// | test_sort_key_panics_for_market        | Market orders have no priority key.               |
// | test_add_order_rejections              | Market type and wrong instrument are rejected.    |
// | test_delete_order_idempotent           | Double delete equals single delete.               |
// | test_reset_clears_everything           | Prices uninitialized, collections empty.          |
// | test_predicates_*                      | Marketability and trigger tables, mirror law.     |
// | test_liquidity_side_on_trigger         | Initial / passive / crossing configurations.      |
// | test_update_order_resorts              | Price replacement moves the order in its list.    |
//--------------------------------------------------------------------------------------------------
