use super::streaming::MarkupFilter;
use crate::api::{StreamSource, TransportError};
use crate::blocks::{BlockContainer, BlockRenderer};
use crate::config::SamplingConfig;
use crate::state::thread_store::ThreadStore;
use crate::types::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Persisted when a request fails before any content arrived.
pub const FALLBACK_ERROR_NOTICE: &str = "_Error: failed to get response._";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerPhase {
    Idle,
    Streaming,
    Finalizing,
}

/// The on-screen assistant message a turn streams into.
pub trait LiveView: BlockContainer + Send {
    fn show_thinking(&mut self) {}
    /// Replace the text region with freshly rendered markup.
    fn render_text(&mut self, html: &str);
    /// Replace every mounted block with `fragments`.
    fn replace_blocks(&mut self, fragments: Vec<String>);
    fn finish(&mut self, _message: &Message) {}
}

/// In-memory view. Keeps what a screen would show plus a redraw count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageView {
    pub thinking: bool,
    pub text_html: String,
    pub fragments: Vec<String>,
    pub text_redraws: usize,
    pub finished: bool,
}

impl BlockContainer for MessageView {
    fn push_fragment(&mut self, html: String) {
        self.thinking = false;
        self.fragments.push(html);
    }
}

impl LiveView for MessageView {
    fn show_thinking(&mut self) {
        self.thinking = true;
    }

    fn render_text(&mut self, html: &str) {
        self.thinking = false;
        self.text_html = html.to_string();
        self.text_redraws += 1;
    }

    fn replace_blocks(&mut self, fragments: Vec<String>) {
        self.thinking = false;
        self.fragments = fragments;
    }

    fn finish(&mut self, _message: &Message) {
        self.thinking = false;
        self.finished = true;
    }
}

/// What one submission produced. `message` is already appended to the store.
#[derive(Debug)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub message: Message,
    pub error: Option<TransportError>,
    pub cancelled: bool,
}

/// Drives one prompt at a time per thread from request to persisted message.
pub struct StreamAssembler {
    pub(super) source: Arc<dyn StreamSource>,
    pub(super) store: Arc<Mutex<ThreadStore>>,
    pub(super) renderer: BlockRenderer,
    pub(super) sampling: SamplingConfig,
    pub(super) markup_filter: MarkupFilter,
    pub(super) phases: Mutex<HashMap<String, AssemblerPhase>>,
}

impl StreamAssembler {
    pub fn new(source: Arc<dyn StreamSource>, store: Arc<Mutex<ThreadStore>>) -> Self {
        Self {
            source,
            store,
            renderer: BlockRenderer::default(),
            sampling: SamplingConfig::default(),
            markup_filter: MarkupFilter::new(),
            phases: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: BlockRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn store(&self) -> MutexGuard<'_, ThreadStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self, thread_id: &str) -> AssemblerPhase {
        self.phases()
            .get(thread_id)
            .copied()
            .unwrap_or(AssemblerPhase::Idle)
    }

    pub(super) fn phases(&self) -> MutexGuard<'_, HashMap<String, AssemblerPhase>> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a thread busy for the lifetime of one submission, including when the
/// submitting future is dropped mid-stream.
pub(super) struct TurnGuard<'a> {
    assembler: &'a StreamAssembler,
    thread_id: String,
}

impl<'a> TurnGuard<'a> {
    /// `None` when the thread already has a turn in flight.
    pub(super) fn acquire(assembler: &'a StreamAssembler, thread_id: &str) -> Option<Self> {
        let mut phases = assembler.phases();
        if phases.contains_key(thread_id) {
            return None;
        }
        phases.insert(thread_id.to_string(), AssemblerPhase::Streaming);
        Some(Self {
            assembler,
            thread_id: thread_id.to_string(),
        })
    }

    pub(super) fn set_phase(&self, phase: AssemblerPhase) {
        self.assembler
            .phases()
            .insert(self.thread_id.clone(), phase);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.assembler.phases().remove(&self.thread_id);
    }
}
