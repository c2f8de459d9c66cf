//! METATAG Events - Typed Event Dispatch
//!
//! A per-instance publish/subscribe hub with several fan-out strategies over
//! one registration set:
//!
//! | strategy | handlers run | result |
//! |---|---|---|
//! | `dispatch` | synchronously, all | `Fanout` of replies |
//! | `async_dispatch` | on a later turn, all | join handle of results |
//! | `sync_dispatch` | in order, each awaited | `()` |
//! | `collect_dispatch` | in order, each awaited | every result |
//! | `every_dispatch` | until one fails | `bool` |
//! | `every_dispatch_all` | all | `bool` |
//! | `some_dispatch` | until one passes | `bool` |
//! | `reduce_dispatch` | in order, chained | final value |
//!
//! Handlers run in registration order under every strategy.

mod binding;
mod emitter;

pub use binding::BoundListener;
pub use emitter::{EventEmitter, Fanout, ListenerId, Reply, Verdict};
