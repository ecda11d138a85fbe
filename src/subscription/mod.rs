//! Ordered, flow-controlled delivery of channel events to one consumer.
//!
//! Every subscription is bound to a single [`AffinityContext`]. The channel
//! fan-out may run anywhere; it only posts work to that context. Buffer
//! mutation and handler invocation happen exclusively on the context, so a
//! handler is never re-entered and sees events in sequence order.
//!
//! An event is buffered instead of delivered when there is no handler, when
//! older events are still buffered, or when flow control is paused. Setting
//! a handler or acknowledging enough bytes schedules a drain of the buffer
//! on the context.

mod affinity;
mod flow;

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DeliveryConfig, OverflowPolicy};
use crate::event::Event;
use crate::sink::SubscriberRegistry;

pub use affinity::{AffinityContext, ContextClosed};
use flow::FlowControl;

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Only events appended after the subscription is created.
    #[default]
    Now,
    /// Every persisted event, then live ones.
    Beginning,
    /// Persisted events from this sequence number on, then live ones.
    Sequence(u64),
}

/// Consumer callback. Always invoked on the subscription's affinity context.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: ReceivedEvent);
}

impl<F> EventHandler for F
where
    F: Fn(ReceivedEvent) + Send + Sync + 'static,
{
    fn handle(&self, event: ReceivedEvent) {
        self(event)
    }
}

/// An event as handed to a handler, able to acknowledge itself.
#[derive(Clone)]
pub struct ReceivedEvent {
    event: Arc<Event>,
    subscription: Weak<SubscriptionCore>,
}

impl ReceivedEvent {
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn into_event(self) -> Arc<Event> {
        self.event
    }

    /// Acknowledge this event's size against the subscription it came from.
    pub fn acknowledge(&self) {
        if let Some(core) = self.subscription.upgrade() {
            core.acknowledge(self.event.size_bytes() as u64);
        }
    }
}

impl Deref for ReceivedEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl fmt::Debug for ReceivedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedEvent")
            .field("channel", &self.event.channel())
            .field("sequence", &self.event.sequence())
            .finish()
    }
}

/// Lifecycle of a subscription. `Unsubscribed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Unsubscribed,
}

struct DeliveryState {
    handler: Option<Arc<dyn EventHandler>>,
    buffer: VecDeque<Arc<Event>>,
    flow: FlowControl,
    state: SubscriptionState,
    drain_scheduled: bool,
}

impl DeliveryState {
    /// Claim the right to schedule a drain, if one is needed and possible.
    fn claim_drain(&mut self) -> bool {
        let needed = self.state == SubscriptionState::Active
            && self.handler.is_some()
            && !self.buffer.is_empty()
            && !self.flow.is_paused()
            && !self.drain_scheduled;
        if needed {
            self.drain_scheduled = true;
        }
        needed
    }
}

enum Admission {
    Deliver(Arc<dyn EventHandler>),
    Buffered,
    Disconnect,
    Dropped,
}

/// Shared subscription state. Registered weakly with its channel.
pub(crate) struct SubscriptionCore {
    id: Uuid,
    channel: String,
    context: AffinityContext,
    buffer_limit: Option<usize>,
    overflow: OverflowPolicy,
    registry: Arc<SubscriberRegistry>,
    /// Lowest sequence this subscription accepts.
    start: AtomicU64,
    delivery: Mutex<DeliveryState>,
}

impl SubscriptionCore {
    pub(crate) fn new(
        channel: &str,
        context: AffinityContext,
        config: &DeliveryConfig,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            context,
            buffer_limit: config.buffer_limit,
            overflow: config.overflow,
            registry,
            start: AtomicU64::new(0),
            delivery: Mutex::new(DeliveryState {
                handler: None,
                buffer: VecDeque::new(),
                flow: FlowControl::new(config.high_water_bytes, config.low_water_bytes),
                state: SubscriptionState::Active,
                drain_scheduled: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Set the first sequence to accept. Called before the subscription is
    /// registered with its channel.
    pub(crate) fn start_at(&self, sequence: u64) {
        self.start.store(sequence, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, DeliveryState> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry point for channel fan-out. Safe to call from any thread.
    pub(crate) fn on_event(self: &Arc<Self>, event: Arc<Event>) {
        let sequence = event.sequence();
        if sequence < self.start.load(Ordering::Acquire) {
            return;
        }
        let core = Arc::clone(self);
        if self.context.execute(move || core.handle_event(event)).is_err() {
            warn!(
                channel = %self.channel,
                subscription = %self.id,
                sequence,
                "Affinity context stopped, event not delivered"
            );
        }
    }

    /// Deliver or buffer one event. Runs on the affinity context.
    fn handle_event(self: &Arc<Self>, event: Arc<Event>) {
        self.context.check();

        let admission = {
            let mut delivery = self.lock();
            if delivery.state == SubscriptionState::Unsubscribed {
                Admission::Dropped
            } else if delivery.handler.is_none()
                || !delivery.buffer.is_empty()
                || delivery.flow.is_paused()
            {
                self.enqueue(&mut delivery, Arc::clone(&event))
            } else {
                delivery.flow.on_delivered(event.size_bytes() as u64);
                match delivery.handler.clone() {
                    Some(handler) => Admission::Deliver(handler),
                    None => Admission::Dropped,
                }
            }
        };

        match admission {
            Admission::Deliver(handler) => self.invoke(&handler, event),
            Admission::Disconnect => {
                warn!(
                    channel = %self.channel,
                    subscription = %self.id,
                    limit = ?self.buffer_limit,
                    "Subscription buffer full, disconnecting"
                );
                self.unsubscribe();
            }
            Admission::Buffered | Admission::Dropped => {}
        }
    }

    fn enqueue(&self, delivery: &mut DeliveryState, event: Arc<Event>) -> Admission {
        if let Some(limit) = self.buffer_limit {
            if delivery.buffer.len() >= limit {
                match self.overflow {
                    OverflowPolicy::Disconnect => return Admission::Disconnect,
                    OverflowPolicy::DropOldest => {
                        if let Some(evicted) = delivery.buffer.pop_front() {
                            warn!(
                                channel = %self.channel,
                                subscription = %self.id,
                                sequence = evicted.sequence(),
                                "Subscription buffer full, dropped oldest event"
                            );
                        }
                    }
                }
            }
        }
        delivery.buffer.push_back(event);
        Admission::Buffered
    }

    fn invoke(self: &Arc<Self>, handler: &Arc<dyn EventHandler>, event: Arc<Event>) {
        handler.handle(ReceivedEvent {
            event,
            subscription: Arc::downgrade(self),
        });
    }

    fn schedule_drain(self: &Arc<Self>) {
        let core = Arc::clone(self);
        if self.context.execute(move || core.drain()).is_err() {
            self.lock().drain_scheduled = false;
        }
    }

    /// Hand buffered events to the handler, oldest first, until the buffer
    /// is empty, flow control pauses, or the handler goes away.
    fn drain(self: &Arc<Self>) {
        self.context.check();

        let mut delivered = 0usize;
        loop {
            let next = {
                let mut delivery = self.lock();
                let ready = delivery.state == SubscriptionState::Active
                    && !delivery.flow.is_paused();
                let handler = delivery.handler.clone().filter(|_| ready);
                match handler.and_then(|h| delivery.buffer.pop_front().map(|e| (h, e))) {
                    Some((handler, event)) => {
                        delivery.flow.on_delivered(event.size_bytes() as u64);
                        Some((handler, event))
                    }
                    None => {
                        delivery.drain_scheduled = false;
                        None
                    }
                }
            };

            match next {
                Some((handler, event)) => {
                    self.invoke(&handler, event);
                    delivered += 1;
                }
                None => break,
            }
        }

        if delivered > 0 {
            debug!(
                channel = %self.channel,
                subscription = %self.id,
                delivered,
                "Drained subscription buffer"
            );
        }
    }

    fn set_handler(self: &Arc<Self>, handler: Option<Arc<dyn EventHandler>>) {
        let schedule = {
            let mut delivery = self.lock();
            if delivery.state == SubscriptionState::Unsubscribed {
                if handler.is_some() {
                    warn!(subscription = %self.id, "Handler set on unsubscribed subscription, ignored");
                }
                return;
            }
            delivery.handler = handler;
            delivery.claim_drain()
        };
        if schedule {
            self.schedule_drain();
        }
    }

    pub(crate) fn acknowledge(self: &Arc<Self>, bytes: u64) {
        let schedule = {
            let mut delivery = self.lock();
            if delivery.flow.acknowledge(bytes) {
                debug!(
                    subscription = %self.id,
                    outstanding = delivery.flow.outstanding(),
                    "Flow control resumed"
                );
            }
            delivery.claim_drain()
        };
        if schedule {
            self.schedule_drain();
        }
    }

    fn unsubscribe(&self) {
        {
            let mut delivery = self.lock();
            if delivery.state == SubscriptionState::Unsubscribed {
                return;
            }
            delivery.state = SubscriptionState::Unsubscribed;
            delivery.handler = None;
            delivery.buffer.clear();
        }
        self.registry.remove(&self.id);
        info!(channel = %self.channel, subscription = %self.id, "Unsubscribed");
    }
}

/// A consumer's live cursor over one channel.
///
/// Clones refer to the same subscription. Dropping every clone detaches it
/// from the channel; [`Subscription::unsubscribe`] does so explicitly.
#[derive(Clone)]
pub struct Subscription {
    core: Arc<SubscriptionCore>,
}

impl Subscription {
    pub(crate) fn from_core(core: Arc<SubscriptionCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn channel(&self) -> &str {
        &self.core.channel
    }

    pub fn context(&self) -> &AffinityContext {
        &self.core.context
    }

    pub fn state(&self) -> SubscriptionState {
        self.core.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    /// Register the delivery callback. Buffered events are drained to it on
    /// the affinity context before any later event.
    pub fn set_handler<H: EventHandler>(&self, handler: H) {
        self.core.set_handler(Some(Arc::new(handler)));
    }

    /// Remove the callback. Subsequent events accumulate in the buffer.
    pub fn clear_handler(&self) {
        self.core.set_handler(None);
    }

    /// Return `bytes` of delivery credit.
    pub fn acknowledge(&self, bytes: u64) {
        self.core.acknowledge(bytes);
    }

    /// Detach from the channel. Idempotent and callable from any thread.
    pub fn unsubscribe(&self) {
        self.core.unsubscribe();
    }

    /// Events waiting for delivery.
    pub fn buffered_len(&self) -> usize {
        self.core.lock().buffer.len()
    }

    /// Delivered bytes not yet acknowledged.
    pub fn outstanding_bytes(&self) -> u64 {
        self.core.lock().flow.outstanding()
    }

    pub fn is_paused(&self) -> bool {
        self.core.lock().flow.is_paused()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.core.id)
            .field("channel", &self.core.channel)
            .field("state", &self.state())
            .finish()
    }
}
