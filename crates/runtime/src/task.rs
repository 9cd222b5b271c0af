//! The five task kinds a worker can own (spec §4.4), unified behind one
//! trait so the event loop never needs to know which kind it is driving.

use std::sync::Arc;
use std::time::Duration;

use channel::Notifier;

use crate::dispatch::{RxDispatcher, RxQueue, TxDispatcher, TxNic, TxRing};

/// What a worker does once a task reports ready.
pub trait Task: Send {
    /// A human-readable label for logging (queue id, scheduler name, …).
    fn label(&self) -> &str;

    /// The task's wakeup source, if it has one. `None` means the task can
    /// only be driven by the spinning loop's tight-rotation poll (an RX
    /// queue whose driver does not support interrupt notification).
    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        None
    }

    /// Cheap non-blocking readiness check, used by the spinning loop and,
    /// after a notifier fires, by the pollable loop to confirm there is
    /// real work (a notifier can fire spuriously).
    fn poll_ready(&mut self) -> bool;

    /// Services the task once. Called after `poll_ready` returns `true`.
    fn service(&mut self);
}

/// RX queue task: burst-receives frames and runs them through
/// [`RxDispatcher`].
pub struct RxQueueTask {
    label: String,
    queue: Box<dyn RxQueue>,
    dispatcher: RxDispatcher,
    burst_size: usize,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RxQueueTask {
    pub fn new(
        label: impl Into<String>,
        queue: Box<dyn RxQueue>,
        dispatcher: RxDispatcher,
        burst_size: usize,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            label: label.into(),
            queue,
            dispatcher,
            burst_size,
            notifier,
        }
    }
}

impl Task for RxQueueTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.clone()
    }

    fn poll_ready(&mut self) -> bool {
        self.queue.has_descriptor_available()
    }

    fn service(&mut self) {
        let frames = self.queue.burst_receive(self.burst_size);
        if !frames.is_empty() {
            self.dispatcher.dispatch_burst(frames);
        }
    }
}

/// TX queue task: burst-dequeues and transmits through [`TxDispatcher`].
pub struct TxQueueTask {
    label: String,
    ring: Box<dyn TxRing>,
    nic: Box<dyn TxNic>,
    dispatcher: TxDispatcher,
    burst_size: usize,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TxQueueTask {
    pub fn new(
        label: impl Into<String>,
        ring: Box<dyn TxRing>,
        nic: Box<dyn TxNic>,
        dispatcher: TxDispatcher,
        burst_size: usize,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            label: label.into(),
            ring,
            nic,
            dispatcher,
            burst_size,
            notifier,
        }
    }
}

impl Task for TxQueueTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.clone()
    }

    fn poll_ready(&mut self) -> bool {
        self.ring.non_empty()
    }

    fn service(&mut self) {
        self.dispatcher.dispatch_burst(self.ring.as_mut(), self.nic.as_mut(), self.burst_size);
    }
}

/// Something driven by a timer or link event: the TX scheduler (§4.7,
/// implemented by `openperf-generator`). Kept as a trait here so this
/// crate does not need to depend on the generator crate.
pub trait Scheduled: Send {
    /// Returns `true` once the next deadline (or a link event) has
    /// arrived.
    fn is_due(&mut self) -> bool;
    fn run(&mut self);
    /// How long the spinning loop should sleep before checking again,
    /// when not due. The pollable loop ignores this and relies on a
    /// timer notifier instead.
    fn poll_interval(&self) -> Duration;
}

pub struct TxSchedulerTask {
    label: String,
    scheduled: Box<dyn Scheduled>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TxSchedulerTask {
    pub fn new(label: impl Into<String>, scheduled: Box<dyn Scheduled>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            label: label.into(),
            scheduled,
            notifier,
        }
    }
}

impl Task for TxSchedulerTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.clone()
    }

    fn poll_ready(&mut self) -> bool {
        self.scheduled.is_due()
    }

    fn service(&mut self) {
        self.scheduled.run();
    }
}

/// Injects ring contents into the TCP/IP stack (the "Stack input" task
/// kind). The ring itself is whatever channel the netstack adapter
/// reads its inbound queue from.
pub trait StackInputRing: Send {
    fn non_empty(&self) -> bool;
    fn drain_into_stack(&mut self);
}

pub struct StackInputTask {
    label: String,
    ring: Box<dyn StackInputRing>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl StackInputTask {
    pub fn new(label: impl Into<String>, ring: Box<dyn StackInputRing>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            label: label.into(),
            ring,
            notifier,
        }
    }
}

impl Task for StackInputTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.notifier.clone()
    }

    fn poll_ready(&mut self) -> bool {
        self.ring.non_empty()
    }

    fn service(&mut self) {
        self.ring.drain_into_stack();
    }
}

/// Invokes a user handler on an arbitrary notifier. The handler may
/// mutate the worker's task list through `loop_handle`, mirroring the
/// spec's "handler may add/remove loop entries".
pub struct CallbackTask {
    label: String,
    notifier: Arc<dyn Notifier>,
    handler: Box<dyn FnMut(&mut dyn std::any::Any) + Send>,
    argument: Box<dyn std::any::Any + Send>,
    fired: bool,
}

impl CallbackTask {
    pub fn new(
        label: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        argument: Box<dyn std::any::Any + Send>,
        handler: Box<dyn FnMut(&mut dyn std::any::Any) + Send>,
    ) -> Self {
        Self {
            label: label.into(),
            notifier,
            handler,
            argument,
            fired: false,
        }
    }
}

impl Task for CallbackTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        Some(self.notifier.clone())
    }

    fn poll_ready(&mut self) -> bool {
        std::mem::take(&mut self.fired)
    }

    fn service(&mut self) {
        (self.handler)(self.argument.as_mut());
    }
}

impl CallbackTask {
    /// Called by the loop right after `notifier.wait()` returns, before
    /// `poll_ready`, so a level-style `fired` flag matches the
    /// edge-triggered notifier it rides on.
    pub fn mark_fired(&mut self) {
        self.fired = true;
    }
}
