use chrono::Utc;
use num_traits::FromPrimitive;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use tickcross::config::Config;
use tickcross::{
    EventBus, EventRecorder, Instrument, MatchingCore, Order, OrderType, Price, Side,
    SimulationHandler,
};

/// Builds a working order for the demo, panicking on invalid combinations.
fn demo_order(
    instrument: &Instrument,
    side: Side,
    order_type: OrderType,
    limit: Option<f64>,
    trigger: Option<f64>,
) -> tickcross::OrderRef {
    let to_price = |value: f64| {
        let decimal = Decimal::from_f64(value).expect("finite demo price");
        Price::from_decimal(decimal, instrument.price_precision).expect("price in range")
    };
    Order::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        instrument.id,
        side,
        order_type,
        limit.map(to_price),
        trigger.map(to_price),
        100_000,
    )
    .expect("valid demo order")
    .into_ref()
}

fn now_ns() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}

fn main() {
    // Initialize tracing (for logging)
    tracing_subscriber::fmt::init();

    let config = Config::try_from_env().unwrap_or_else(|_| Config::default());
    let instrument = Instrument::new(
        config.instrument_id,
        config.instrument_symbol.clone(),
        config.price_precision,
    );
    info!(app_id = %config.app_id, symbol = %instrument.symbol, "starting matching core demo");

    // Event plumbing: the core and the simulated venue publish into one bus.
    let bus = EventBus::new(config.app_id.clone());
    let subscription = bus.subscribe();
    let mut recorder = EventRecorder::new("./events", 1_000)
        .map_err(|err| eprintln!("event recorder disabled: {err}"))
        .ok();

    let handler = SimulationHandler::new(bus.clone());
    let mut core = MatchingCore::with_event_bus(instrument.clone(), Box::new(handler), bus);

    // A spread of conditional orders around a 100.00 market.
    let orders = [
        demo_order(&instrument, Side::Buy, OrderType::Limit, Some(99.50), None),
        demo_order(&instrument, Side::Buy, OrderType::StopMarket, None, Some(101.00)),
        demo_order(
            &instrument,
            Side::Buy,
            OrderType::LimitIfTouched,
            Some(99.00),
            Some(99.25),
        ),
        demo_order(
            &instrument,
            Side::Sell,
            OrderType::StopLimit,
            Some(98.75),
            Some(99.00),
        ),
    ];
    for order in &orders {
        core.add_order(order.clone()).expect("demo order accepted");
        core.match_order(order, true).expect("demo order matchable");
    }

    // Random-walk the top of book and sweep after every tick.
    let mut rng = rand::thread_rng();
    let mut mid: i64 = 10_000;
    for step in 0..200 {
        mid += rng.gen_range(-15..=15);
        core.set_bid_raw(mid - 5);
        core.set_ask_raw(mid + 5);
        core.set_last_raw(mid);
        core.iterate(now_ns()).expect("sweep");

        for (event, metadata) in subscription.drain() {
            println!("[{}] #{} {:?}", metadata.timestamp, metadata.sequence, event);
            if let Some(recorder) = recorder.as_mut() {
                recorder.record(&event, &metadata).ok();
            }
        }

        if orders.iter().all(|o| o.borrow().is_closed()) {
            info!(steps = step + 1, "all demo orders completed");
            break;
        }
    }

    let open = orders.iter().filter(|o| !o.borrow().is_closed()).count();
    println!(
        "done: bid={:?} ask={:?} last={:?}, {} order(s) still working",
        core.bid().map(|p| p.to_string()),
        core.ask().map(|p| p.to_string()),
        core.last().map(|p| p.to_string()),
        open
    );
}
