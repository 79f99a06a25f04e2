use crate::error::EngineError;
use crate::generation::{Generation, RoundStream};
use crate::request::RoundRequest;

/// A generation engine, the inner loop driven by the ralph loop.
///
/// One call runs one bounded round: model calls and tool calls alternate
/// until the model stops asking for tools or the request's
/// [`ToolStopCondition`](crate::ToolStopCondition) fires. Retrying failed
/// model calls is the engine's business; whatever error it finally returns
/// aborts the outer loop.
///
/// Once the engine is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it.
///
/// # Cancel safety
///
/// Callers may drop the returned futures and streams at any time to cancel
/// a round. Implementations must stop their work when that happens.
pub trait Engine: Send + Sync {
    /// The error type that may be returned by the engine.
    type Error: EngineError;

    /// The stream type for streaming rounds.
    type Stream: RoundStream<Error = Self::Error>;

    /// Runs a round to completion.
    fn run_round(
        &self,
        req: RoundRequest,
    ) -> impl Future<Output = Result<Generation, Self::Error>> + Send;

    /// Starts a round in streaming mode.
    ///
    /// The semantics are identical to [`Engine::run_round`], except that
    /// the caller drives the round by polling the returned stream.
    fn stream_round(
        &self,
        req: RoundRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send;
}
