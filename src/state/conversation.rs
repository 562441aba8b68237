mod core;
mod state;
mod streaming;


pub use state::{
    AssemblerPhase, LiveView, MessageView, StreamAssembler, TurnOutcome, FALLBACK_ERROR_NOTICE,
};
