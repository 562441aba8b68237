use super::state::{AssemblerPhase, LiveView, StreamAssembler, TurnGuard, TurnOutcome};
use super::streaming::TurnAccumulator;
use crate::api::{open_frames, AskRequest, FrameStream, TransportError};
use crate::blocks::to_block;
use crate::markdown;
use crate::state::error::{
    ConcurrencyViolationSnafu, EmptyPromptSnafu, NothingToRetrySnafu, StoreSnafu, SubmitError,
};
use crate::state::redraw::{RedrawScheduler, TickSource};
use crate::types::{Block, Event, Message, MessageBody};
use futures::StreamExt;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

enum Flow {
    Continue,
    Done,
}

impl StreamAssembler {
    /// Send `prompt` into `thread_id` and stream the reply into `view`.
    ///
    /// Rejected without touching the store when the thread already has a turn
    /// in flight. Otherwise the user prompt and exactly one assistant message
    /// are appended, whether the request succeeds, fails or is cancelled.
    pub async fn submit(
        &self,
        thread_id: &str,
        prompt: &str,
        view: &mut dyn LiveView,
        ticks: &mut dyn TickSource,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, SubmitError> {
        if prompt.trim().is_empty() {
            return EmptyPromptSnafu.fail();
        }
        let Some(guard) = TurnGuard::acquire(self, thread_id) else {
            tracing::info!(thread_id, "rejected prompt while a response is streaming");
            return ConcurrencyViolationSnafu { thread_id }.fail();
        };

        self.store()
            .append_message(thread_id, Message::user(prompt))
            .context(StoreSnafu)?;
        view.show_thinking();

        let request = AskRequest::new(prompt).with_defaults(&self.sampling);
        let mut accumulator = TurnAccumulator::default();
        let (error, cancelled) = match open_frames(self.source.as_ref(), &request).await {
            Ok(frames) => {
                self.stream_turn(frames, &mut accumulator, view, ticks, &cancel)
                    .await
            }
            Err(error) => (Some(error), false),
        };

        guard.set_phase(AssemblerPhase::Finalizing);
        if let Some(error) = &error {
            tracing::warn!(thread_id, %error, "response stream failed");
        } else if accumulator.is_empty() {
            tracing::debug!(thread_id, "response stream closed without content");
        }

        if accumulator.is_block_structured() {
            redraw_text(&mut accumulator, view);
        }
        let message = accumulator.into_message(error.is_some());
        if let MessageBody::Text(text) = &message.body {
            view.render_text(&markdown::render(text));
        }
        view.finish(&message);

        self.store()
            .append_message(thread_id, message.clone())
            .context(StoreSnafu)?;
        drop(guard);

        Ok(TurnOutcome {
            thread_id: thread_id.to_string(),
            message,
            error,
            cancelled,
        })
    }

    /// Send the thread's most recent user prompt again as a new turn.
    pub async fn retry(
        &self,
        thread_id: &str,
        view: &mut dyn LiveView,
        ticks: &mut dyn TickSource,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, SubmitError> {
        let prompt = self
            .store()
            .last_user_prompt(thread_id)
            .context(StoreSnafu)?;
        let Some(prompt) = prompt else {
            return NothingToRetrySnafu { thread_id }.fail();
        };
        self.submit(thread_id, &prompt, view, ticks, cancel).await
    }

    async fn stream_turn(
        &self,
        mut frames: FrameStream,
        accumulator: &mut TurnAccumulator,
        view: &mut dyn LiveView,
        ticks: &mut dyn TickSource,
        cancel: &CancellationToken,
    ) -> (Option<TransportError>, bool) {
        let mut scheduler = RedrawScheduler::new(ticks);
        let mut error = None;
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("stream cancelled");
                    cancelled = true;
                    break;
                }
                _ = scheduler.ready() => {
                    redraw_text(accumulator, view);
                }
                next = frames.next() => match next {
                    None => break,
                    Some(Err(stream_error)) => {
                        error = Some(stream_error);
                        break;
                    }
                    Some(Ok(frame)) => {
                        let event = Event::from_frame(frame);
                        if let Flow::Done = self
                            .apply_event(event, accumulator, &mut scheduler, view)
                            .await
                        {
                            break;
                        }
                    }
                },
            }
        }

        // A redraw still waiting for its tick must not land after the turn ends.
        scheduler.cancel();
        (error, cancelled)
    }

    async fn apply_event(
        &self,
        event: Event,
        accumulator: &mut TurnAccumulator,
        scheduler: &mut RedrawScheduler<'_>,
        view: &mut dyn LiveView,
    ) -> Flow {
        match event {
            Event::Token { text } => self.buffer_token(&text, accumulator, scheduler),
            Event::Tool(call) => {
                scheduler.take();
                redraw_text(accumulator, view);
                match to_block(&call) {
                    Some(block) => {
                        let fragment = self.renderer.render(&block).await;
                        view.push_fragment(fragment);
                        accumulator.push_tool_block(block);
                    }
                    None => tracing::debug!("ignoring tool event without a name"),
                }
            }
            Event::Final {
                blocks: Some(blocks),
                ..
            }
            | Event::Message { blocks } => {
                scheduler.take();
                self.replace_with_blocks(blocks, accumulator, view).await;
            }
            Event::Final {
                text: Some(text),
                blocks: None,
            } => {
                scheduler.take();
                accumulator.replace_text(text);
                view.render_text(&markdown::render(&accumulator.text));
            }
            Event::Final {
                text: None,
                blocks: None,
            } => {}
            Event::Done => return Flow::Done,
            other @ Event::Other { .. } => match other.legacy_text() {
                Some(text) => self.buffer_token(text, accumulator, scheduler),
                None => tracing::debug!(kind = other.kind(), "ignoring event"),
            },
        }
        Flow::Continue
    }

    fn buffer_token(
        &self,
        text: &str,
        accumulator: &mut TurnAccumulator,
        scheduler: &mut RedrawScheduler<'_>,
    ) {
        if !self.markup_filter.allows(text) {
            tracing::debug!("dropping token carrying raw markup");
            return;
        }
        accumulator.push_chunk(text);
        scheduler.schedule();
    }

    async fn replace_with_blocks(
        &self,
        blocks: Vec<Block>,
        accumulator: &mut TurnAccumulator,
        view: &mut dyn LiveView,
    ) {
        let mut fragments: Vec<String> = Vec::with_capacity(blocks.len());
        self.renderer.mount_all(&blocks, &mut fragments).await;
        view.render_text("");
        view.replace_blocks(fragments);
        accumulator.replace_with_blocks(blocks);
    }
}

fn redraw_text(accumulator: &mut TurnAccumulator, view: &mut dyn LiveView) {
    if accumulator.fold_pending() {
        view.render_text(&markdown::render(&accumulator.text));
    }
}
