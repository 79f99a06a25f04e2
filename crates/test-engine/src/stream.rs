use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use ralph_loop_model::tool::ToolCall;
use ralph_loop_model::{
    FinishReason, Generation, Message, RoundEvent, RoundStream,
    ToolCallRequest, ToolCallResult, ToolSet, Usage,
};
use tokio::time::{Sleep, sleep};

use crate::preset::Action;

/// Builds a [`Generation`] out of replayed actions.
#[derive(Default)]
pub(crate) struct Assembler {
    text: String,
    step_text: String,
    messages: Vec<Message>,
    steps: u32,
    finish_reason: Option<FinishReason>,
}

impl Assembler {
    pub(crate) fn push_delta(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.step_text.push_str(delta);
    }

    pub(crate) fn push_tool_call(&mut self, call: ToolCallRequest) {
        self.flush_text();
        self.messages.push(Message::ToolCall(call));
    }

    pub(crate) fn push_tool_result(&mut self, result: ToolCallResult) {
        self.messages.push(Message::ToolResult(result));
    }

    pub(crate) fn end_step(&mut self, reason: FinishReason) {
        self.flush_text();
        self.steps += 1;
        self.finish_reason = Some(reason);
    }

    pub(crate) fn finish(mut self, usage: Usage) -> Generation {
        self.flush_text();
        Generation {
            text: self.text,
            messages: self.messages,
            steps: self.steps,
            finish_reason: self.finish_reason,
            usage,
        }
    }

    fn flush_text(&mut self) {
        if !self.step_text.is_empty() {
            let text = std::mem::take(&mut self.step_text);
            self.messages.push(Message::Assistant(text));
        }
    }
}

/// A streaming round replayed from a preset.
pub struct ScriptedStream {
    actions: VecDeque<Action>,
    assembler: Option<Assembler>,
    tools: ToolSet,
    usage: Usage,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    pending_tool: Option<ToolCall>,
    generation: Option<Generation>,
}

impl ScriptedStream {
    pub(crate) fn new(
        actions: VecDeque<Action>,
        tools: ToolSet,
        usage: Usage,
        delay: Duration,
    ) -> Self {
        Self {
            actions,
            assembler: Some(Assembler::default()),
            tools,
            usage,
            delay,
            sleep: None,
            pending_tool: None,
            generation: None,
        }
    }

    fn complete(&mut self) {
        if let Some(assembler) = self.assembler.take() {
            self.generation = Some(assembler.finish(self.usage));
        }
    }
}

impl RoundStream for ScriptedStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<RoundEvent>, Self::Error>> {
        let this = self.get_mut();

        // A tool call is running, its result is the next event.
        if let Some(pending_tool) = &mut this.pending_tool {
            let result = ready!(pending_tool.as_mut().poll(cx));
            this.pending_tool = None;
            if let Some(assembler) = &mut this.assembler {
                assembler.push_tool_result(result.clone());
            }
            return Poll::Ready(Ok(Some(RoundEvent::ToolResult(result))));
        }

        if this.actions.is_empty() {
            this.complete();
            return Poll::Ready(Ok(None));
        }

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let Some(action) = this.actions.pop_front() else {
            this.complete();
            return Poll::Ready(Ok(None));
        };
        let Some(assembler) = &mut this.assembler else {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        };
        let event = match action {
            Action::Delta(delta) => {
                assembler.push_delta(&delta);
                RoundEvent::TextDelta(delta)
            }
            Action::Call(call) => {
                assembler.push_tool_call(call.clone());
                this.pending_tool = Some(this.tools.call(call.clone()));
                RoundEvent::ToolCall(call)
            }
            Action::EndStep(reason) => {
                assembler.end_step(reason);
                RoundEvent::StepFinished(reason)
            }
        };
        Poll::Ready(Ok(Some(event)))
    }

    #[inline]
    fn generation(&self) -> Option<Generation> {
        self.generation.clone()
    }
}
