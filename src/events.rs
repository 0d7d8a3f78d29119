//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Observability layer for the matching core: event payloads, a synchronous fan-out bus, and a
// JSONL recorder for offline inspection. Nothing here sits on the matching hot path decision
// logic; publishing is fire-and-forget.
//
// | Component     | Description                                                     |
// |---------------|-----------------------------------------------------------------|
// | Event         | What happened (order added/deleted, trigger, fill, market move). |
// | EventMetadata | Who published it, when, and in what sequence.                    |
// | EventBus      | Multi-subscriber fan-out over unbounded channels.                |
// | EventRecorder | Rotating JSONL log of published events.                          |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::types::{LiquiditySide, Price, Side};

/// Events published by the matching core and its execution handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// A working order entered the core.
    OrderAdded {
        order_id: Uuid,
        instrument_id: Uuid,
        side: Side,
    },
    /// A working order was removed from the core.
    OrderDeleted { order_id: Uuid, instrument_id: Uuid },
    /// A conditional order activated.
    StopTriggered {
        order_id: Uuid,
        instrument_id: Uuid,
        triggered_price: Option<Price>,
    },
    /// An order completed as a market-style fill.
    MarketOrderFilled { order_id: Uuid, instrument_id: Uuid },
    /// An order completed as a limit-style fill.
    LimitOrderFilled {
        order_id: Uuid,
        instrument_id: Uuid,
        liquidity_side: Option<LiquiditySide>,
    },
}

/// Envelope attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMetadata {
    /// Unique identifier for the event.
    pub id: Uuid,
    /// Timestamp when the event was published.
    pub timestamp: DateTime<Utc>,
    /// Monotonic sequence number per bus instance.
    pub sequence: u64,
    /// Source component that published the event.
    pub source: String,
}

/// A receiving end registered with an [`EventBus`].
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: Receiver<(Event, EventMetadata)>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Blocks until the next event arrives or the bus is dropped.
    pub fn receive(&self) -> Option<(Event, EventMetadata)> {
        self.receiver.recv().ok()
    }

    /// Returns the next event if one is already queued.
    pub fn try_receive(&self) -> Option<(Event, EventMetadata)> {
        self.receiver.try_recv().ok()
    }

    /// Drains every queued event without blocking.
    pub fn drain(&self) -> Vec<(Event, EventMetadata)> {
        let mut events = Vec::new();
        while let Some(item) = self.try_receive() {
            events.push(item);
        }
        events
    }
}

/// Fan-out bus distributing events to any number of subscribers.
///
/// Clones share the subscriber map and the sequence counter, so a core and its
/// execution handler can each hold a clone and publish into the same stream.
/// Publishing never blocks; a subscriber that falls behind simply queues.
#[derive(Debug, Clone)]
pub struct EventBus {
    senders: Arc<RwLock<HashMap<Uuid, Sender<(Event, EventMetadata)>>>>,
    sequence: Arc<AtomicU64>,
    source: String,
}

impl EventBus {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            sequence: Arc::new(AtomicU64::new(1)),
            source: source.into(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = unbounded();
        self.senders.write().insert(id, sender);
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.senders.write().remove(&subscription_id).is_some()
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: Event) {
        let metadata = EventMetadata {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            source: self.source.clone(),
        };

        // Collect senders first so slow subscribers are never reached under the lock.
        let senders: Vec<_> = self.senders.read().values().cloned().collect();
        for sender in senders {
            let _ = sender.try_send((event.clone(), metadata.clone()));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new("matching-core")
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    metadata: &'a EventMetadata,
    event: &'a Event,
}

/// Writes events to rotating JSONL files, one record per line.
pub struct EventRecorder {
    output_dir: PathBuf,
    writer: Option<BufWriter<File>>,
    events_in_file: usize,
    max_events_per_file: usize,
    file_index: u32,
}

impl EventRecorder {
    /// Creates a recorder writing under `output_dir`, rotating after
    /// `max_events_per_file` records.
    pub fn new<P: AsRef<Path>>(output_dir: P, max_events_per_file: usize) -> std::io::Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)?;
        }
        Ok(Self {
            output_dir,
            writer: None,
            events_in_file: 0,
            max_events_per_file,
            file_index: 0,
        })
    }

    fn open_new_file(&mut self) -> std::io::Result<()> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.file_index += 1;
        let path = self
            .output_dir
            .join(format!("events_{timestamp}_{:04}.jsonl", self.file_index));
        tracing::debug!(path = %path.display(), "rotating event log");
        self.writer = Some(BufWriter::new(File::create(path)?));
        self.events_in_file = 0;
        Ok(())
    }

    /// Appends one event record, rotating the underlying file when full.
    pub fn record(&mut self, event: &Event, metadata: &EventMetadata) -> std::io::Result<()> {
        if self.writer.is_none() || self.events_in_file >= self.max_events_per_file {
            self.open_new_file()?;
        }

        let writer = self.writer.as_mut().expect("writer opened above");
        let line = serde_json::to_string(&EventRecord { metadata, event })?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.events_in_file += 1;
        Ok(())
    }
}
