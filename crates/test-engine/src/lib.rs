//! A scripted, in-memory generation engine for testing purpose.

mod preset;
mod stream;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ralph_loop_model::{
    Engine, EngineError, ErrorKind, Generation, Message, RoundRequest,
};
use tokio::time::sleep;

pub use preset::*;
pub use stream::ScriptedStream;

use crate::preset::{Action, plan_actions};
use crate::stream::Assembler;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new<S: Into<String>>(message: S, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl EngineError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A request the engine has received.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub model: String,
    pub instructions: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    /// Whether the round was requested in streaming mode.
    pub streamed: bool,
}

impl RecordedRequest {
    /// Returns `true` if any user turn of the request equals `text`.
    pub fn has_user_turn(&self, text: &str) -> bool {
        self.messages
            .iter()
            .any(|msg| matches!(msg, Message::User(t) if t == text))
    }
}

#[derive(Default)]
struct Script {
    rounds: VecDeque<PresetRound>,
    requests: Vec<RecordedRequest>,
}

/// A scripted engine for testing purpose.
///
/// Before sending requests, you need to set up the script, which is how the
/// engine should answer each round. Rounds are consumed in the order they
/// were added, one per request (streaming or not). If the script runs out
/// of rounds, an error is returned. Every request is recorded and can be
/// inspected with [`ScriptedEngine::requests`].
///
/// Clones share the same script.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    #[inline]
    pub fn add_round(&mut self, preset: PresetRound) {
        self.lock().rounds.push_back(preset);
    }

    #[inline]
    pub fn add_text_round<S: Into<String>>(&mut self, text: S) {
        self.add_round(PresetRound::with_text(text));
    }

    /// Sets the delay before the round starts and between streamed events.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of rounds not consumed yet.
    pub fn remaining_rounds(&self) -> usize {
        self.lock().rounds.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn take_round(
        &self,
        req: &RoundRequest,
        streamed: bool,
    ) -> Result<(PresetRound, VecDeque<Action>), Error> {
        let mut script = self.lock();
        script.requests.push(RecordedRequest {
            model: req.model.clone(),
            instructions: req.instructions.clone(),
            messages: req.messages.clone(),
            tools: req.tools.names().map(ToOwned::to_owned).collect(),
            streamed,
        });
        let Some(round) = script.rounds.pop_front() else {
            return Err(Error::new("no enough rounds", ErrorKind::Other));
        };
        if let Some(message) = &round.failure {
            return Err(Error::new(message.clone(), ErrorKind::Other));
        }
        let actions = plan_actions(&round.events, &req.tool_stop);
        Ok((round, actions))
    }

    #[inline]
    fn delay(&self) -> Duration {
        self.delay.unwrap_or(Duration::from_millis(1))
    }
}

impl Engine for ScriptedEngine {
    type Error = crate::Error;
    type Stream = ScriptedStream;

    fn run_round(
        &self,
        req: RoundRequest,
    ) -> impl Future<Output = Result<Generation, Self::Error>> + Send {
        let taken = self.take_round(&req, false);
        let delay = self.delay();
        async move {
            let (round, actions) = taken?;
            sleep(delay).await;

            let mut assembler = Assembler::default();
            for action in actions {
                match action {
                    Action::Delta(delta) => assembler.push_delta(&delta),
                    Action::Call(call) => {
                        assembler.push_tool_call(call.clone());
                        let result = req.tools.call(call).await;
                        assembler.push_tool_result(result);
                    }
                    Action::EndStep(reason) => assembler.end_step(reason),
                }
            }
            Ok(assembler.finish(round.usage))
        }
    }

    fn stream_round(
        &self,
        req: RoundRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send {
        let taken = self.take_round(&req, true);
        let delay = self.delay();
        async move {
            let (round, actions) = taken?;
            Ok(ScriptedStream::new(actions, req.tools, round.usage, delay))
        }
    }
}

impl Debug for ScriptedEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("remaining_rounds", &self.remaining_rounds())
            .field("delay", &self.delay)
            .finish()
    }
}
