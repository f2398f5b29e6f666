//! The bounded concurrent pipeline: inbound message → intake controller → intake queue →
//! worker pool → outtake queue → dispatch pool → chat channel.
//!
//! Queues are bounded tokio mpsc channels; a full queue makes its producer wait. A queue is
//! closed once every sender is dropped, and consumers keep draining until it is empty.

mod dispatch;
mod intake;
mod lifecycle;
mod queue;
mod stats;
mod unit;
mod worker;

pub use intake::{compose_prompt, CommandSet, IntakeController, Parsed};
pub use lifecycle::{LifecycleState, Pipeline, PipelineSettings};
pub use queue::SharedReceiver;
pub use stats::{PipelineReport, PipelineStats};
pub use unit::{RequestUnit, ResponseKind, ResponseUnit};
