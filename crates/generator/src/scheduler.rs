//! Per-port-queue TX scheduler state machine, spec §4.7.
//!
//! Implements [`runtime::Scheduled`] so a worker can drive it like any
//! other task. All deadlines are derived from the previous deadline,
//! never from the clock reading at service time, so the schedule does
//! not drift.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fib::{Directory, PortId, QueueId, SourceId};
use runtime::Scheduled;

pub const IDLE_POLL: Duration = Duration::from_millis(100);
pub const LINK_CHECK_POLL: Duration = Duration::from_micros(100);
pub const SCHEDULE_POLL: Duration = Duration::from_millis(100);
pub const BLOCK_POLL: Duration = Duration::from_nanos(100);

/// Accepts bursts of fully-built frames for transmission. Implemented
/// by whatever owns the port-queue's hardware or shared-memory ring;
/// the return value is how many frames were actually accepted.
pub trait TxOutput: Send {
    fn enqueue(&mut self, frames: &[Vec<u8>]) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    LinkCheck,
    Running,
    Blocked,
}

struct HeapEntry {
    deadline: Instant,
    source: SourceId,
}

pub struct TxScheduler {
    port: PortId,
    queue: QueueId,
    directory: Arc<Directory>,
    output: Box<dyn TxOutput>,
    link_up: Box<dyn FnMut() -> bool + Send>,
    state: State,
    heap: BinaryHeap<Reverse<(Instant, SourceId)>>,
    next_reschedule: Instant,
    next_wake: Instant,
    blocked_remaining: Vec<Vec<u8>>,
    blocked_entry: Option<HeapEntry>,
}

impl TxScheduler {
    pub fn new(
        port: PortId,
        queue: QueueId,
        directory: Arc<Directory>,
        output: Box<dyn TxOutput>,
        link_up: Box<dyn FnMut() -> bool + Send>,
    ) -> Self {
        let now = Instant::now();
        Self {
            port,
            queue,
            directory,
            output,
            link_up,
            state: State::Idle,
            heap: BinaryHeap::new(),
            next_reschedule: now,
            next_wake: now,
            blocked_remaining: Vec::new(),
            blocked_entry: None,
        }
    }

    fn any_active_source(&self) -> bool {
        let snapshot = self.directory.load();
        snapshot
            .tib
            .sources_for(self.port, self.queue)
            .iter()
            .any(|(_, source)| source.active())
    }

    fn reschedule_active_sources(&mut self, now: Instant) {
        let snapshot = self.directory.load();
        let known: ahash::AHashSet<SourceId> = self.heap.iter().map(|Reverse((_, id))| *id).collect();
        for (source_id, source) in snapshot.tib.sources_for(self.port, self.queue) {
            if source.active() && !known.contains(source_id) {
                self.heap.push(Reverse((now, *source_id)));
            }
        }
        self.next_reschedule = now + SCHEDULE_POLL;
    }

    fn service_due_entries(&mut self, now: Instant) {
        let snapshot = self.directory.load();
        while let Some(&Reverse((deadline, source_id))) = self.heap.peek() {
            if deadline > now {
                break;
            }
            self.heap.pop();

            let Some(source) = snapshot.tib.lookup(self.port, self.queue, source_id) else {
                continue;
            };

            let mut frames = Vec::new();
            source.transform(&mut frames);
            let accepted = self.output.enqueue(&frames);

            if accepted < frames.len() {
                self.blocked_remaining = frames[accepted..].to_vec();
                self.blocked_entry = Some(HeapEntry { deadline, source: source_id });
                self.state = State::Blocked;
                return;
            }

            let interval_nanos = if source.burst_size() > 0 {
                (1_000_000_000u64 / source.packet_rate().max(1)) * source.burst_size() as u64
            } else {
                SCHEDULE_POLL.as_nanos() as u64
            };
            self.heap.push(Reverse((deadline + Duration::from_nanos(interval_nanos), source_id)));
        }
    }
}

impl Scheduled for TxScheduler {
    fn is_due(&mut self) -> bool {
        Instant::now() >= self.next_wake
    }

    fn run(&mut self) {
        let now = Instant::now();

        match self.state {
            State::Idle => {
                if self.any_active_source() {
                    self.state = if (self.link_up)() { State::Running } else { State::LinkCheck };
                    self.next_reschedule = now;
                    self.next_wake = now;
                } else {
                    self.next_wake = now + IDLE_POLL;
                }
            }
            State::LinkCheck => {
                if (self.link_up)() {
                    self.heap.clear();
                    self.blocked_remaining.clear();
                    self.blocked_entry = None;
                    self.state = State::Running;
                    self.next_reschedule = now;
                    self.next_wake = now;
                } else {
                    self.next_wake = now + LINK_CHECK_POLL;
                }
            }
            State::Running => {
                if now >= self.next_reschedule {
                    self.reschedule_active_sources(now);
                }

                self.service_due_entries(now);

                if self.state == State::Blocked {
                    self.next_wake = now + BLOCK_POLL;
                    return;
                }

                let top_deadline = self.heap.peek().map(|Reverse((deadline, _))| *deadline);
                let next = match top_deadline {
                    Some(deadline) => deadline.min(self.next_reschedule),
                    None => self.next_reschedule,
                };
                self.next_wake = next.max(now + Duration::from_nanos(1));
            }
            State::Blocked => {
                let accepted = self.output.enqueue(&self.blocked_remaining);
                if accepted < self.blocked_remaining.len() {
                    self.blocked_remaining.drain(0..accepted);
                    self.next_wake = now + BLOCK_POLL;
                    return;
                }

                self.blocked_remaining.clear();
                if let Some(entry) = self.blocked_entry.take() {
                    let snapshot = self.directory.load();
                    if let Some(source) = snapshot.tib.lookup(self.port, self.queue, entry.source) {
                        let interval_nanos = if source.burst_size() > 0 {
                            (1_000_000_000u64 / source.packet_rate().max(1)) * source.burst_size() as u64
                        } else {
                            SCHEDULE_POLL.as_nanos() as u64
                        };
                        self.heap.push(Reverse((entry.deadline + Duration::from_nanos(interval_nanos), entry.source)));
                    }
                }

                self.state = State::Running;
                self.next_wake = now;
            }
        }
    }

    fn poll_interval(&self) -> Duration {
        match self.state {
            State::Idle => IDLE_POLL,
            State::LinkCheck => LINK_CHECK_POLL,
            State::Running => Duration::from_nanos(1),
            State::Blocked => BLOCK_POLL,
        }
    }
}
