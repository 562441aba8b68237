pub mod conversation;
mod error;
pub mod redraw;
pub mod thread_store;

pub use conversation::{
    AssemblerPhase, LiveView, MessageView, StreamAssembler, TurnOutcome, FALLBACK_ERROR_NOTICE,
};
pub use error::{StoreError, SubmitError};
pub use redraw::{IntervalTicks, ManualTickHandle, ManualTicks, RedrawScheduler, TickSource};
pub use thread_store::{Clock, IdGenerator, RandomIds, SystemClock, ThreadStore};
