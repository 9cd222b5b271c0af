//! Worker threads, each pinned to a CPU and running one of two event
//! loops over a disjoint set of tasks: RX queue, TX queue, TX scheduler,
//! stack input, and callback (spec §4.4).

pub mod dispatch;
pub mod task;
pub mod worker;

pub use dispatch::{Frame, RxDispatcher, RxQueue, StackInput, TxDispatcher, TxNic, TxRing};
pub use task::{CallbackTask, RxQueueTask, Scheduled, StackInputRing, StackInputTask, Task, TxQueueTask, TxSchedulerTask};
pub use worker::{LoopMode, Worker};
