// Expose the modules
pub mod config;
pub mod events;
pub mod handlers;
pub mod matching_core;
pub mod types;

// Re-export key types for easier usage
pub use events::{Event, EventBus, EventMetadata, EventRecorder, Subscription};
pub use handlers::{ExecutionHandler, SimulationHandler};
pub use matching_core::{order_sort_key, MatchingCore, MatchingError, MatchingResult};
pub use types::{
    Instrument, LiquiditySide, Order, OrderRef, OrderStatus, OrderType, Price, Side, TypeError,
};
