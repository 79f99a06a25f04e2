use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use ralph_loop_model::{Generation, RoundEvent};
use tokio::time::Instant;
use tokio_util::sync::WaitForCancellationFutureOwned;

use super::driver::LoopDriver;
use crate::engine_client::BoxRoundStream;
use crate::error::LoopError;
use crate::outcome::{CompletionReason, LoopOutcome};

/// The final iteration of a loop, streamed.
///
/// Poll it as a [`Stream`] of [`RoundEvent`]s, or with
/// [`LoopStream::next_event`]. Once drained, the streamed generation is
/// evaluated and [`LoopStream::outcome`] becomes available: `verified` if
/// the verdict is complete, `max-iterations` otherwise, whatever the
/// iteration bound. Dropping the stream cancels the round.
pub struct LoopStream {
    state: StreamState,
    outcome: Option<LoopOutcome>,
}

enum StreamState {
    Streaming(Box<Streaming>),
    Settling(BoxFuture<'static, LoopOutcome>),
    Done,
}

struct Streaming {
    driver: LoopDriver,
    iteration: u32,
    started: Instant,
    round: BoxRoundStream,
    text: String,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

enum RoundEnd {
    Drained,
    Failed(LoopError),
}

impl Streaming {
    fn poll_round(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<RoundEvent, RoundEnd>> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(RoundEnd::Failed(LoopError::Cancelled {
                iteration: self.iteration,
            })));
        }

        match ready!(self.round.as_mut().poll_next_event(cx)) {
            Ok(Some(event)) => {
                trace!("got an event: {event:?}");
                if let RoundEvent::TextDelta(delta) = &event {
                    self.text.push_str(delta);
                }
                Poll::Ready(Ok(event))
            }
            Ok(None) => Poll::Ready(Err(RoundEnd::Drained)),
            Err(failure) => {
                error!("stream failed ({}): {failure}", failure.kind());
                Poll::Ready(Err(RoundEnd::Failed(LoopError::generation(
                    self.iteration,
                    failure,
                ))))
            }
        }
    }

    fn settle(self: Box<Self>, end: RoundEnd) -> BoxFuture<'static, LoopOutcome> {
        let Streaming {
            driver,
            iteration,
            started,
            round,
            text,
            ..
        } = *self;
        match end {
            RoundEnd::Drained => {
                let generation = round
                    .generation()
                    .unwrap_or_else(|| Generation::from_text(text));
                Box::pin(driver.finish_streamed(iteration, started, generation))
            }
            RoundEnd::Failed(err) => Box::pin(async move {
                driver.finish(CompletionReason::Aborted, Some(err))
            }),
        }
    }
}

impl LoopStream {
    pub(super) fn new(
        driver: LoopDriver,
        iteration: u32,
        started: Instant,
        round: BoxRoundStream,
    ) -> Self {
        let cancelled = Box::pin(driver.cancellation().cancelled_owned());
        Self {
            state: StreamState::Streaming(Box::new(Streaming {
                driver,
                iteration,
                started,
                round,
                text: String::new(),
                cancelled,
            })),
            outcome: None,
        }
    }

    pub(super) fn finished(outcome: LoopOutcome) -> Self {
        Self {
            state: StreamState::Done,
            outcome: Some(outcome),
        }
    }

    /// Returns the next event, or `None` once the loop has finished.
    #[inline]
    pub async fn next_event(&mut self) -> Option<RoundEvent> {
        self.next().await
    }

    /// Returns the outcome, available once the stream is drained.
    #[inline]
    pub fn outcome(&self) -> Option<&LoopOutcome> {
        self.outcome.as_ref()
    }

    /// Returns `true` if the stream is drained.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    /// Drains the remaining events and returns the outcome.
    pub async fn finish(mut self) -> LoopOutcome {
        while self.next_event().await.is_some() {}
        self.outcome
            .take()
            .expect("a drained stream should have an outcome")
    }
}

impl Stream for LoopStream {
    type Item = RoundEvent;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                StreamState::Streaming(streaming) => {
                    let end = match ready!(streaming.poll_round(cx)) {
                        Ok(event) => return Poll::Ready(Some(event)),
                        Err(end) => end,
                    };
                    if let StreamState::Streaming(streaming) =
                        mem::replace(&mut this.state, StreamState::Done)
                    {
                        this.state = StreamState::Settling(streaming.settle(end));
                    }
                }
                StreamState::Settling(settling) => {
                    let outcome = ready!(settling.as_mut().poll(cx));
                    this.outcome = Some(outcome);
                    this.state = StreamState::Done;
                }
                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}
