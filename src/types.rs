//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the data types shared by the matching core and its callers: fixed-point
// prices, the instrument descriptor, order enums, and the order record itself.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | ENUMS              | Side, OrderType, LiquiditySide, OrderStatus.                     |
// | PRICE              | Fixed-point price (raw i64 scaled by 10^precision).              |
// | STRUCTS            | Instrument and Order records.                                    |
// | ERRORS             | Construction-time validation errors.                             |
// | TESTS              | Unit tests for the defined types.                                |
//--------------------------------------------------------------------------------------------------

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
//  ENUMS
//--------------------------------------------------------------------------------------------------

/// Represents the side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// A buy order, resting on the bid side.
    Buy,
    /// A sell order, resting on the ask side.
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Represents the type of an order, which selects its trigger and fill behavior.
///
/// `Market` exists so that upstream gateways can express the full order-type set,
/// but market orders execute immediately and never rest in the matching core;
/// [`crate::MatchingCore::add_order`] rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Executes at a specific price or better.
    Limit,
    /// Executes immediately at the best available price. Never rests.
    Market,
    /// Submitted as a market order, then rests as a limit at its first fill price.
    MarketToLimit,
    /// Becomes a market order when the market trades through the trigger price.
    StopMarket,
    /// Becomes a limit order when the market trades through the trigger price.
    StopLimit,
    /// Becomes a market order when the market touches the trigger price.
    MarketIfTouched,
    /// Becomes a limit order when the market touches the trigger price.
    LimitIfTouched,
    /// Stop-market whose trigger trails the market by an offset.
    TrailingStopMarket,
    /// Stop-limit whose trigger trails the market by an offset.
    TrailingStopLimit,
}

impl OrderType {
    /// True when orders of this type carry a limit price.
    pub fn has_limit_price(&self) -> bool {
        matches!(
            self,
            Self::Limit
                | Self::MarketToLimit
                | Self::StopLimit
                | Self::LimitIfTouched
                | Self::TrailingStopLimit
        )
    }

    /// True when orders of this type carry a trigger price.
    pub fn has_trigger_price(&self) -> bool {
        matches!(
            self,
            Self::StopMarket
                | Self::StopLimit
                | Self::MarketIfTouched
                | Self::LimitIfTouched
                | Self::TrailingStopMarket
                | Self::TrailingStopLimit
        )
    }
}

/// Which side of the liquidity ledger a fill lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquiditySide {
    /// The order rested in the book before filling (provided liquidity).
    Maker,
    /// The order crossed the book on arrival (removed liquidity).
    Taker,
}

/// Represents the lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been accepted but not yet matched.
    Submitted,
    /// A conditional order waiting for its trigger condition.
    WaitingTrigger,
    /// The order has been partially filled.
    PartiallyFilled,
    /// The order was partially filled and then cancelled.
    PartiallyFilledCancelled,
    /// The order has been completely filled.
    Filled,
    /// The order was cancelled before being filled.
    Cancelled,
    /// The order was rejected.
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses take the order out of every future sweep.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::PartiallyFilledCancelled | Self::Rejected
        )
    }
}

//--------------------------------------------------------------------------------------------------
//  PRICE
//--------------------------------------------------------------------------------------------------

/// A fixed-point price: a signed raw integer scaled by `10^precision`.
///
/// All matching comparisons operate on `raw` alone. Prices are only ever compared
/// within a single instrument, so the two sides of any comparison share a
/// precision; the derived ordering (raw first) is therefore a plain integer
/// compare on the hot path. Decimal conversion happens at the edges only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Scaled integer value, e.g. 100.50 at precision 2 is `10050`.
    pub raw: i64,
    /// Number of decimal places carried by `raw`.
    pub precision: u8,
}

impl Price {
    pub fn new(raw: i64, precision: u8) -> Self {
        Self { raw, precision }
    }

    /// Converts a decimal value into a raw price at the given precision.
    ///
    /// Returns `None` when the scaled value does not fit in an `i64`.
    pub fn from_decimal(value: Decimal, precision: u8) -> Option<Self> {
        let scale = Decimal::from(10i64.checked_pow(u32::from(precision))?);
        let raw = value.checked_mul(scale)?.round_dp(0).to_i64()?;
        Some(Self { raw, precision })
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.raw, u32::from(self.precision))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

//--------------------------------------------------------------------------------------------------
//  STRUCTS
//--------------------------------------------------------------------------------------------------

/// Immutable descriptor of a tradable instrument.
///
/// The matching core reads `price_precision` when materializing [`Price`] values
/// from its raw bid/ask/last slots; everything else is carried for logging and
/// event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique identifier for the instrument.
    pub id: Uuid,
    /// Human-readable symbol, e.g. `BTC-PERP`.
    pub symbol: String,
    /// Decimal places of the instrument's prices.
    pub price_precision: u8,
}

impl Instrument {
    pub fn new(id: Uuid, symbol: impl Into<String>, price_precision: u8) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            price_precision,
        }
    }
}

/// Shared handle to a working order.
///
/// The matching core and its execution handler both mutate the order through
/// this handle; the external owner keeps its own clones. Cores are single-owner
/// and single-threaded, so `Rc<RefCell<_>>` is sufficient.
pub type OrderRef = Rc<RefCell<Order>>;

/// A trading order as seen by the matching core.
///
/// Price fields are validated at construction: limit-bearing types must carry a
/// limit price and trigger-bearing types a trigger price, so the matchers can
/// treat absence as a bug rather than a runtime condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Client order id; unique per working order.
    pub id: Uuid,
    /// Optional external identifier provided by the client.
    pub ext_id: Option<String>,
    /// Identifier for the account placing the order.
    pub account_id: Uuid,
    /// Identifier for the instrument being traded.
    pub instrument_id: Uuid,
    /// Side of the order.
    pub side: Side,
    /// Type of the order.
    pub order_type: OrderType,
    /// Limit price for limit-bearing types.
    pub limit_price: Option<Price>,
    /// Activation threshold for trigger-bearing types.
    pub trigger_price: Option<Price>,
    /// The price at which the order actually activated, set by the core.
    pub triggered_price: Option<Price>,
    /// Whether a conditional order has activated.
    pub is_triggered: bool,
    /// Set by the core when the order fills or triggers.
    pub liquidity_side: Option<LiquiditySide>,
    /// Initial quantity in base units.
    pub base_amount: u64,
    /// Remaining quantity in base units.
    pub remaining_base: u64,
    /// Current status of the order.
    pub status: OrderStatus,
    /// Timestamp of order creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last update to the order.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order, validating required price fields for the order type.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::MissingLimitPrice`] / [`TypeError::MissingTriggerPrice`]
    /// when the order type requires a price that was not supplied, and
    /// [`TypeError::InvalidQuantity`] for a zero quantity.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        account_id: Uuid,
        instrument_id: Uuid,
        side: Side,
        order_type: OrderType,
        limit_price: Option<Price>,
        trigger_price: Option<Price>,
        base_amount: u64,
    ) -> Result<Self, TypeError> {
        if base_amount == 0 {
            return Err(TypeError::InvalidQuantity(base_amount));
        }
        if order_type.has_limit_price() && limit_price.is_none() {
            return Err(TypeError::MissingLimitPrice(order_type));
        }
        if order_type.has_trigger_price() && trigger_price.is_none() {
            return Err(TypeError::MissingTriggerPrice(order_type));
        }

        let now = Utc::now();
        let status = if order_type.has_trigger_price() {
            OrderStatus::WaitingTrigger
        } else {
            OrderStatus::Submitted
        };

        Ok(Self {
            id,
            ext_id: None,
            account_id,
            instrument_id,
            side,
            order_type,
            limit_price,
            trigger_price,
            triggered_price: None,
            is_triggered: false,
            liquidity_side: None,
            base_amount,
            remaining_base: base_amount,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Wraps the order in the shared handle used by the matching core.
    pub fn into_ref(self) -> OrderRef {
        Rc::new(RefCell::new(self))
    }

    /// True when the order is in a terminal status and must be skipped by sweeps.
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records the price at which the order activated.
    pub fn set_triggered_price(&mut self, price: Price) {
        self.triggered_price = Some(price);
        self.updated_at = Utc::now();
    }

    pub fn set_liquidity_side(&mut self, liquidity_side: LiquiditySide) {
        self.liquidity_side = Some(liquidity_side);
    }

    /// Activates a conditional order.
    pub fn mark_triggered(&mut self) {
        self.is_triggered = true;
        if self.status == OrderStatus::WaitingTrigger {
            self.status = OrderStatus::Submitted;
        }
        self.updated_at = Utc::now();
    }

    /// Completes the order in full.
    pub fn mark_filled(&mut self) {
        self.remaining_base = 0;
        self.status = OrderStatus::Filled;
        self.updated_at = Utc::now();
    }

    /// Cancels the order, preserving any partial-fill history in the status.
    pub fn mark_cancelled(&mut self) {
        self.status = if self.status == OrderStatus::PartiallyFilled {
            OrderStatus::PartiallyFilledCancelled
        } else {
            OrderStatus::Cancelled
        };
        self.updated_at = Utc::now();
    }
}

//--------------------------------------------------------------------------------------------------
//  ERRORS
//--------------------------------------------------------------------------------------------------

/// Errors raised when constructing domain values from raw inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// The order type requires a limit price and none was supplied.
    #[error("order type {0:?} requires a limit price")]
    MissingLimitPrice(OrderType),
    /// The order type requires a trigger price and none was supplied.
    #[error("order type {0:?} requires a trigger price")]
    MissingTriggerPrice(OrderType),
    /// The quantity is not tradable.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(u64),
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
// | Name                            | Description                                        |
// |---------------------------------|----------------------------------------------------|
// | test_price_decimal_roundtrip    | Raw <-> Decimal conversion at several precisions.  |
// | test_price_ordering             | Prices order by raw value.                         |
// | test_order_type_price_fields    | has_limit_price / has_trigger_price coverage.      |
// | test_order_validation           | Construction rejects missing prices and zero qty.  |
// | test_order_lifecycle            | Trigger and fill transitions.                      |
//--------------------------------------------------------------------------------------------------
