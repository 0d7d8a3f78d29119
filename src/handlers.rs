//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name               | Description                                          | Key Methods        |
// |--------------------|------------------------------------------------------|--------------------|
// | ExecutionHandler   | Sink for trigger and fill effects                    | trigger_stop_order |
// |                    |                                                      | fill_market_order  |
// |                    |                                                      | fill_limit_order   |
// | SimulationHandler  | Simulated venue: applies effects, publishes events   |                    |
//--------------------------------------------------------------------------------------------------

use tracing::debug;

use crate::events::{Event, EventBus};
use crate::types::OrderRef;

/// Sink for the effects of matching decisions.
///
/// The matching core decides *when* an order triggers or fills; implementations
/// of this trait decide *what that means* (book an execution, emit exchange
/// events, route to a venue adapter). Calls are synchronous and arrive on the
/// thread driving the core.
///
/// Implementations are expected to set `is_triggered` on the order inside
/// `trigger_stop_order` (see [`crate::types::Order::mark_triggered`]); the core
/// does not inspect the handler's effects beyond the fields documented on
/// [`crate::types::Order`].
pub trait ExecutionHandler {
    /// A conditional order's activation threshold has been reached.
    fn trigger_stop_order(&mut self, order: &OrderRef);

    /// The order should be executed as a market-style fill.
    fn fill_market_order(&mut self, order: &OrderRef);

    /// The order should be executed as a limit-style fill.
    fn fill_limit_order(&mut self, order: &OrderRef);
}

/// A simulated execution venue.
///
/// Applies the canonical order-state effects (activation flag, fill status) and
/// publishes the corresponding events, which makes it suitable for backtests
/// and for driving the core in the demo binary. Live adapters would replace
/// this with a handler that routes to a real venue.
pub struct SimulationHandler {
    bus: EventBus,
}

impl SimulationHandler {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl ExecutionHandler for SimulationHandler {
    fn trigger_stop_order(&mut self, order: &OrderRef) {
        let (order_id, instrument_id, triggered_price) = {
            let mut order = order.borrow_mut();
            order.mark_triggered();
            (order.id, order.instrument_id, order.triggered_price)
        };
        debug!(%order_id, "stop order triggered");
        self.bus.publish(Event::StopTriggered {
            order_id,
            instrument_id,
            triggered_price,
        });
    }

    fn fill_market_order(&mut self, order: &OrderRef) {
        let (order_id, instrument_id) = {
            let mut order = order.borrow_mut();
            order.mark_filled();
            (order.id, order.instrument_id)
        };
        debug!(%order_id, "market order filled");
        self.bus.publish(Event::MarketOrderFilled {
            order_id,
            instrument_id,
        });
    }

    fn fill_limit_order(&mut self, order: &OrderRef) {
        let (order_id, instrument_id, liquidity_side) = {
            let mut order = order.borrow_mut();
            order.mark_filled();
            (order.id, order.instrument_id, order.liquidity_side)
        };
        debug!(%order_id, ?liquidity_side, "limit order filled");
        self.bus.publish(Event::LimitOrderFilled {
            order_id,
            instrument_id,
            liquidity_side,
        });
    }
}
