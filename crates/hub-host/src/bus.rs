//! Typed pub/sub event bus

use dashmap::DashMap;
use hub_core::{Context, Event, EventData, EventType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Channel capacity for each event-type subscription
const CHANNEL_CAPACITY: usize = 256;

/// The central message broker of the hub
///
/// Components subscribe to specific event types (or to everything) and fire
/// events for other components to react to. Payloads travel as JSON; the
/// typed subscription API decodes them back into their `EventData` type.
pub struct EventBus {
    /// Per-event-type broadcast senders, created lazily on first subscribe
    channels: DashMap<EventType, broadcast::Sender<Event>>,
    /// Sender feeding match-all subscribers
    any: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (any, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            channels: DashMap::new(),
            any,
        }
    }

    /// Subscribe to events of one type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "subscribing");

        if event_type.is_match_all() {
            return self.any.subscribe();
        }

        self.channels
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to a well-known event type, decoding payloads to `T`
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(&self) -> TypedReceiver<T> {
        TypedReceiver {
            rx: self.subscribe(T::event_type()),
            _marker: std::marker::PhantomData,
        }
    }

    /// Subscribe to every event
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.any.subscribe()
    }

    /// Fire an event to type-specific and match-all subscribers
    ///
    /// Send errors are ignored; they only mean no receiver is listening.
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "firing event");

        if let Some(sender) = self.channels.get(&event.event_type) {
            let _ = sender.send(event.clone());
        }
        let _ = self.any.send(event);
    }

    /// Fire a typed payload under its well-known event type
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let typed = Event::typed(data, context);
        let payload = serde_json::to_value(&typed.data).unwrap_or_default();
        self.fire(Event {
            event_type: typed.event_type,
            data: payload,
            time_fired: typed.time_fired,
            context: typed.context,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a typed subscription
pub struct TypedReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedReceiver<T> {
    /// Receive the next event whose payload decodes as `T`
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            match serde_json::from_value::<T>(event.data) {
                Ok(data) => {
                    return Ok(Event {
                        event_type: event.event_type,
                        data,
                        time_fired: event.time_fired,
                        context: event.context,
                    })
                }
                // Undecodable payload on a shared event type, skip it
                Err(_) => continue,
            }
        }
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
