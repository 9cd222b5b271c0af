//! Packet template expansion, TX scheduling, and ARP/ND learning for
//! the traffic generator/learning subsystem (spec §4.7, component C7).
//!
//! [`template`] expands a packet template and its modifiers into a
//! concrete sequence of frames; [`signature`] packs the Spirent-style
//! trailer those frames may carry; [`validate`] enforces the bounds a
//! generator definition must satisfy before expansion; [`scheduler`]
//! drives the deadline-heap TX scheduler state machine per port-queue;
//! [`learning`] resolves next-hop MACs before a generator starts;
//! [`source`] is the [`fib::TxSource`] the scheduler actually pulls
//! frames from.

pub mod error;
pub mod learning;
pub mod scheduler;
pub mod signature;
pub mod source;
pub mod template;
pub mod validate;

pub use error::Error;
pub use learning::{LearningHandle, Resolution, State as LearningState};
pub use scheduler::{TxOutput, TxScheduler};
pub use signature::GeneratorSignature;
pub use source::{LoadDescriptor, TrafficSource, TxLimit};
pub use template::{FieldModifier, LengthPolicy, Modifier, PacketTemplate, ProtocolTemplate, Tie};
