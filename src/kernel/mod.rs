// Host-loop plumbing
// Single execution context, no preemption. A load runs to completion
// inside one call; its outcome is latched and announced from poll().

pub mod events;

pub use events::{EventLatch, Observers, PollEvent};
