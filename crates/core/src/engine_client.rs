use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use ralph_loop_model::{
    Engine, EngineError, ErrorKind, Generation, RoundEvent, RoundRequest,
    RoundStream,
};
use tracing::Instrument;

use crate::error::BoxError;

/// An engine error with its concrete type erased.
#[derive(Debug)]
pub(crate) struct EngineFailure {
    kind: ErrorKind,
    source: BoxError,
}

impl EngineFailure {
    fn new<E: EngineError>(err: E) -> Self {
        Self {
            kind: err.kind(),
            source: Box::new(err),
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub(crate) fn into_parts(self) -> (ErrorKind, BoxError) {
        (self.kind, self.source)
    }
}

impl Display for EngineFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.source, f)
    }
}

impl StdError for EngineFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.source()
    }
}

/// A [`RoundStream`] with its concrete type erased.
pub(crate) trait ErasedRoundStream: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<RoundEvent>, EngineFailure>>;

    fn generation(&self) -> Option<Generation>;
}

pin_project! {
    struct StreamAdapter<S> {
        #[pin]
        inner: S,
    }
}

impl<S: RoundStream> ErasedRoundStream for StreamAdapter<S> {
    #[inline]
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<RoundEvent>, EngineFailure>> {
        self.project()
            .inner
            .poll_next_event(cx)
            .map_err(EngineFailure::new)
    }

    #[inline]
    fn generation(&self) -> Option<Generation> {
        self.inner.generation()
    }
}

pub(crate) type BoxRoundStream = Pin<Box<dyn ErasedRoundStream>>;

type RunFn = Arc<
    dyn Fn(RoundRequest) -> BoxFuture<'static, Result<Generation, EngineFailure>>
        + Send
        + Sync,
>;
type StreamFn = Arc<
    dyn Fn(RoundRequest) -> BoxFuture<'static, Result<BoxRoundStream, EngineFailure>>
        + Send
        + Sync,
>;

/// A wrapper around an engine that provides a type-erased interface for
/// the other modules.
#[derive(Clone)]
pub(crate) struct EngineClient {
    run_fn: RunFn,
    stream_fn: StreamFn,
}

impl EngineClient {
    pub(crate) fn new<E: Engine + 'static>(engine: E) -> Self {
        // `RalphLoop` has no generic parameter, so the engine type is
        // erased here. Both closures share the same engine.
        let engine = Arc::new(engine);

        let run_fn: RunFn = {
            let engine = Arc::clone(&engine);
            Arc::new(move |req| {
                let engine = Arc::clone(&engine);
                Box::pin(
                    async move {
                        trace!("sending a round: {req:?}");
                        let result = engine.run_round(req).await;
                        match result {
                            Ok(generation) => {
                                trace!("round finished: {generation:?}");
                                Ok(generation)
                            }
                            Err(err) => {
                                error!("round failed: {err:?}");
                                Err(EngineFailure::new(err))
                            }
                        }
                    }
                    .instrument(trace_span!("engine round")),
                )
            })
        };

        let stream_fn: StreamFn = Arc::new(move |req| {
            let engine = Arc::clone(&engine);
            Box::pin(
                async move {
                    trace!("streaming a round: {req:?}");
                    match engine.stream_round(req).await {
                        Ok(stream) => {
                            let stream: BoxRoundStream =
                                Box::pin(StreamAdapter { inner: stream });
                            Ok(stream)
                        }
                        Err(err) => {
                            error!("failed to open the stream: {err:?}");
                            Err(EngineFailure::new(err))
                        }
                    }
                }
                .instrument(trace_span!("engine stream")),
            )
        });

        Self { run_fn, stream_fn }
    }

    /// Runs a round to completion.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe as long as the engine is.
    #[inline]
    pub(crate) fn run_round(
        &self,
        req: RoundRequest,
    ) -> BoxFuture<'static, Result<Generation, EngineFailure>> {
        (self.run_fn)(req)
    }

    /// Starts a round in streaming mode.
    #[inline]
    pub(crate) fn stream_round(
        &self,
        req: RoundRequest,
    ) -> BoxFuture<'static, Result<BoxRoundStream, EngineFailure>> {
        (self.stream_fn)(req)
    }
}

impl Debug for EngineClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient").finish_non_exhaustive()
    }
}
