use std::future::ready;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use ralph_loop_model::tool::ToolResult;
use ralph_loop_model::{
    FinishReason, Message, RoundEvent, Tool, ToolStopCondition,
};
use ralph_loop_test_engine::{PresetRound, ScriptedEngine};
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::evaluator::{DEFAULT_JUDGE_INSTRUCTIONS, DEFAULT_QUESTION};
use crate::stop::TokenBudgetExceeds;
use crate::{
    BoxError, CompletionReason, EvaluationInput, Evaluator, LoopConfig,
    LoopError, LoopInput, RalphLoopBuilder, Verdict,
};

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let filter = std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ralph_loop_core=trace".to_owned());
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(filter)
                .try_init()
                .ok();
        }
    });
}

fn engine_with(texts: &[&str]) -> ScriptedEngine {
    let mut engine = ScriptedEngine::default();
    for text in texts {
        engine.add_text_round(*text);
    }
    engine
}

fn builder(engine: &ScriptedEngine) -> RalphLoopBuilder {
    init_logging();
    RalphLoopBuilder::with_engine(engine.clone()).with_model("main")
}

/// Completes once the latest text passes `done`, otherwise asks for a fix
/// mentioning the iteration.
fn complete_when(done: fn(&str) -> bool) -> Evaluator {
    Evaluator::callback(move |input: EvaluationInput| async move {
        Ok::<_, BoxError>(if done(&input.latest.text) {
            Verdict::completed().with_reason("looks good")
        } else {
            Verdict::incomplete(format!("fix iteration {}", input.iteration))
        })
    })
}

struct LookupTool;

impl Tool for LookupTool {
    type Input = Value;

    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Looks something up"
    }

    fn parameter_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send {
        ready(Ok("found".to_owned()))
    }
}

#[tokio::test]
async fn test_runs_until_max_iterations() {
    let engine = engine_with(&["a", "b", "c", "d"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .with_max_iterations(3)
        .build()
        .unwrap();

    let outcome = ralph.run("Write a poem").await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.all_iteration_results.len(), 3);
    assert_eq!(outcome.final_text, "c");
    assert_eq!(outcome.reason.as_deref(), Some("fix iteration 3"));
    assert!(outcome.error.is_none());
    assert_eq!(engine.requests().len(), 3);
    assert_eq!(engine.remaining_rounds(), 1);

    let indices: Vec<_> = outcome
        .all_iteration_results
        .iter()
        .map(|record| record.iteration)
        .collect();
    assert_eq!(indices, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_verified_stops_early() {
    let engine = engine_with(&["v1", "v2", "v3", "v4", "v5"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "v3"))
        .with_max_iterations(5)
        .build()
        .unwrap();

    let outcome = ralph.run("Count to three").await;
    assert!(outcome.is_verified());
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.final_text, "v3");
    assert_eq!(outcome.reason.as_deref(), Some("looks good"));
    assert_eq!(
        outcome.last_result.as_ref().map(|g| g.text.as_str()),
        Some("v3")
    );
    assert_eq!(engine.remaining_rounds(), 2);
}

#[tokio::test]
async fn test_feedback_injection() {
    let engine = engine_with(&["v1", "v2", "v3"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "v3"))
        .build()
        .unwrap();

    let outcome = ralph.run("Count to three").await;
    assert!(outcome.is_verified());

    let requests = engine.requests();
    assert!(!requests[0].has_user_turn("fix iteration 1"));
    assert!(requests[1].has_user_turn("fix iteration 1"));
    assert!(!requests[1].has_user_turn("fix iteration 2"));
    assert!(requests[2].has_user_turn("fix iteration 2"));

    // The history is append-only, with feedback right after each attempt.
    assert_eq!(
        requests[2].messages,
        vec![
            Message::User("Count to three".to_owned()),
            Message::Assistant("v1".to_owned()),
            Message::User("fix iteration 1".to_owned()),
            Message::Assistant("v2".to_owned()),
            Message::User("fix iteration 2".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_blank_feedback_is_not_injected() {
    let engine = engine_with(&["a", "b"]);
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::callback(|_: EvaluationInput| async {
            Ok::<_, BoxError>(Verdict::incomplete("   "))
        }))
        .with_max_iterations(2)
        .build()
        .unwrap();

    ralph.run("Do it").await;
    let requests = engine.requests();
    assert_eq!(
        requests[1].messages,
        vec![
            Message::User("Do it".to_owned()),
            Message::Assistant("a".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_single_iteration() {
    let engine = engine_with(&["only", "never"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .with_max_iterations(1)
        .build()
        .unwrap();
    let outcome = ralph.run("Try once").await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(engine.requests().len(), 1);

    let engine = engine_with(&["only"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| true))
        .with_max_iterations(1)
        .build()
        .unwrap();
    let outcome = ralph.run("Try once").await;
    assert!(outcome.is_verified());
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn test_default_max_iterations() {
    let engine = engine_with(&["x"; 12]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .build()
        .unwrap();
    let outcome = ralph.run("Never done").await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 10);
    assert_eq!(engine.remaining_rounds(), 2);
}

#[tokio::test]
async fn test_custom_stop_condition() {
    let mut engine = ScriptedEngine::default();
    for _ in 0..5 {
        engine.add_round(PresetRound::with_text("work").with_usage(40, 10));
    }
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .with_max_iterations(5)
        .stop_when(TokenBudgetExceeds(100))
        .build()
        .unwrap();

    let outcome = ralph.run("Spend tokens").await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.usage.total(), 150);
}

#[tokio::test]
async fn test_callback_error_aborts() {
    let engine = engine_with(&["a", "b", "c"]);
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::callback(
            |input: EvaluationInput| async move {
                if input.iteration == 2 {
                    Err("checker crashed".into())
                } else {
                    Ok::<_, BoxError>(false)
                }
            },
        ))
        .with_max_iterations(5)
        .build()
        .unwrap();

    let outcome = ralph.run("Do it").await;
    assert_eq!(outcome.completion_reason, CompletionReason::Aborted);
    assert_eq!(outcome.iterations, 2);
    assert!(matches!(
        outcome.error,
        Some(LoopError::Evaluation { iteration: 2, .. })
    ));
    assert!(outcome.reason.as_deref().unwrap().contains("checker crashed"));

    // The failed evaluation is still recorded, without a verdict.
    assert_eq!(outcome.all_iteration_results.len(), 2);
    assert!(outcome.all_iteration_results[1].verdict.is_none());
    assert_eq!(engine.requests().len(), 2);

    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.iteration(), Some(2));
}

#[tokio::test]
async fn test_generation_failure_aborts() {
    let evaluations = Arc::new(AtomicU32::new(0));
    let mut engine = engine_with(&["a"]);
    engine.add_round(PresetRound::failing("model overloaded"));
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::callback({
            let evaluations = Arc::clone(&evaluations);
            move |_: EvaluationInput| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(false) }
            }
        }))
        .build()
        .unwrap();

    let outcome = ralph.run("Do it").await;
    assert_eq!(outcome.completion_reason, CompletionReason::Aborted);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.all_iteration_results.len(), 1);
    assert_eq!(outcome.final_text, "a");
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    let Some(LoopError::Generation { iteration, source, .. }) = &outcome.error
    else {
        panic!("expected a generation error, got {:?}", outcome.error);
    };
    assert_eq!(*iteration, 2);
    assert!(source.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn test_idempotence() {
    let texts = ["v1", "v2"];
    let mut engine = engine_with(&texts);
    for text in texts {
        engine.add_text_round(text);
    }
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "v2"))
        .build()
        .unwrap();

    let first = ralph.run("Count").await;
    let second = ralph.clone().run("Count").await;
    assert_eq!(first.completion_reason, second.completion_reason);
    assert_eq!(first.iterations, second.iterations);
    assert_eq!(first.final_text, second.final_text);
    let verdicts = |outcome: &crate::LoopOutcome| {
        outcome
            .all_iteration_results
            .iter()
            .map(|record| record.verdict.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));

    let requests = engine.requests();
    assert_eq!(requests[0].messages, requests[2].messages);
    assert_eq!(requests[1].messages, requests[3].messages);
}

#[tokio::test]
async fn test_self_judge() {
    let engine = engine_with(&["draft", "NO\nAdd a title.", "final", "YES"]);
    let ralph = builder(&engine)
        .with_instructions("You are a writer.")
        .with_tool(LookupTool)
        .with_evaluator(Evaluator::self_judge())
        .build()
        .unwrap();

    let outcome = ralph.run("Write an essay").await;
    assert!(outcome.is_verified());
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.final_text, "final");
    assert_eq!(outcome.reason.as_deref(), Some("YES"));

    let requests = engine.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].tools, vec!["lookup".to_owned()]);

    let judge = &requests[1];
    assert!(judge.tools.is_empty());
    assert_eq!(judge.model, "main");
    assert_eq!(judge.instructions.as_deref(), Some("You are a writer."));
    assert_eq!(
        judge.messages.last(),
        Some(&Message::User(DEFAULT_QUESTION.to_owned()))
    );
    assert!(judge.messages.contains(&Message::Assistant("draft".to_owned())));

    // The judge's answer is the feedback, the question is not kept.
    assert!(requests[2].has_user_turn("NO\nAdd a title."));
    assert!(!requests[2].has_user_turn(DEFAULT_QUESTION));
}

#[tokio::test]
async fn test_judge_model() {
    let engine = engine_with(&["answer", "Done. Looks right."]);
    let ralph = builder(&engine)
        .with_evaluator(
            Evaluator::judge_model("judge").with_question("Finished?"),
        )
        .build()
        .unwrap();

    let outcome = ralph.run("Answer the question").await;
    assert!(outcome.is_verified());

    let judge = &engine.requests()[1];
    assert_eq!(judge.model, "judge");
    assert_eq!(
        judge.instructions.as_deref(),
        Some(DEFAULT_JUDGE_INSTRUCTIONS)
    );
    assert!(judge.has_user_turn("Finished?"));
}

#[tokio::test]
async fn test_malformed_judgement_aborts() {
    let engine = engine_with(&["answer", "..."]);
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::self_judge())
        .build()
        .unwrap();

    let outcome = ralph.run("Answer").await;
    assert_eq!(outcome.completion_reason, CompletionReason::Aborted);
    assert!(matches!(
        outcome.error,
        Some(LoopError::Evaluation { iteration: 1, .. })
    ));
}

#[tokio::test]
async fn test_judge_failure_is_evaluation_error() {
    let mut engine = engine_with(&["answer"]);
    engine.add_round(PresetRound::failing("judge offline"));
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::judge_model("judge"))
        .build()
        .unwrap();

    let outcome = ralph.run("Answer").await;
    assert!(matches!(
        outcome.error,
        Some(LoopError::Evaluation { iteration: 1, .. })
    ));
}

#[tokio::test]
async fn test_cancel_before_second_iteration() {
    let token = CancellationToken::new();
    let engine = engine_with(&["a", "b"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .on_iteration_finish({
            let token = token.clone();
            move |_| token.cancel()
        })
        .build()
        .unwrap();

    let outcome = ralph
        .run(LoopInput::new("Do it").with_cancellation(token))
        .await;
    assert_eq!(outcome.completion_reason, CompletionReason::Aborted);
    assert!(matches!(
        outcome.error,
        Some(LoopError::Cancelled { iteration: 2 })
    ));
    assert_eq!(outcome.all_iteration_results.len(), 1);
    assert_eq!(engine.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_flight() {
    let token = CancellationToken::new();
    let evaluations = Arc::new(AtomicU32::new(0));
    let mut engine = engine_with(&["slow"]);
    engine.set_delay(Duration::from_secs(60));
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::callback({
            let evaluations = Arc::clone(&evaluations);
            move |_: EvaluationInput| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(true) }
            }
        }))
        .build()
        .unwrap();

    tokio::spawn({
        let token = token.clone();
        async move {
            sleep(Duration::from_millis(20)).await;
            token.cancel();
        }
    });
    let outcome = timeout(
        Duration::from_secs(5),
        ralph.run(LoopInput::new("Do it").with_cancellation(token)),
    )
    .await
    .unwrap();

    assert!(outcome.error.as_ref().unwrap().is_cancelled());
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.all_iteration_results.is_empty());
    assert_eq!(evaluations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_evaluation() {
    let token = CancellationToken::new();
    let finished = Arc::new(AtomicU32::new(0));
    let engine = engine_with(&["first", "second"]);
    let ralph = builder(&engine)
        .with_evaluator(Evaluator::callback(|_: EvaluationInput| async {
            sleep(Duration::from_secs(60)).await;
            Ok::<_, BoxError>(true)
        }))
        .on_iteration_finish({
            let finished = Arc::clone(&finished);
            move |record| {
                assert!(record.verdict.is_none());
                finished.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    tokio::spawn({
        let token = token.clone();
        async move {
            sleep(Duration::from_millis(20)).await;
            token.cancel();
        }
    });
    let outcome = timeout(
        Duration::from_secs(5),
        ralph.run(LoopInput::new("Do it").with_cancellation(token)),
    )
    .await
    .unwrap();

    assert_eq!(outcome.completion_reason, CompletionReason::Aborted);
    assert!(matches!(
        outcome.error,
        Some(LoopError::Cancelled { iteration: 1 })
    ));
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.all_iteration_results.len(), 1);
    assert!(outcome.all_iteration_results[0].verdict.is_none());
    assert_eq!(outcome.final_text, "first");
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(engine.requests().len(), 1);
    assert_eq!(engine.remaining_rounds(), 1);
}

#[tokio::test]
async fn test_observers() {
    let starts = Arc::new(Mutex::new(vec![]));
    let ends = Arc::new(Mutex::new(vec![]));
    let verdicts = Arc::new(Mutex::new(vec![]));
    let finished = Arc::new(AtomicU32::new(0));
    let engine = engine_with(&["a", "b"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "b"))
        .on_iteration_start({
            let starts = Arc::clone(&starts);
            move |iteration| starts.lock().unwrap().push(iteration)
        })
        .on_iteration_end({
            let ends = Arc::clone(&ends);
            move |iteration, generation| {
                ends.lock()
                    .unwrap()
                    .push((iteration, generation.text.clone()))
            }
        })
        .on_iteration_finish({
            let verdicts = Arc::clone(&verdicts);
            move |record| {
                verdicts
                    .lock()
                    .unwrap()
                    .push(record.verdict.as_ref().map(|v| v.complete))
            }
        })
        .on_finish({
            let finished = Arc::clone(&finished);
            move |outcome| {
                assert!(outcome.is_verified());
                finished.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    ralph.run("Do it").await;
    assert_eq!(*starts.lock().unwrap(), vec![1, 2]);
    assert_eq!(
        *ends.lock().unwrap(),
        vec![(1, "a".to_owned()), (2, "b".to_owned())]
    );
    assert_eq!(*verdicts.lock().unwrap(), vec![Some(false), Some(true)]);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_observer_is_ignored() {
    let engine = engine_with(&["a", "b"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "b"))
        .on_iteration_start(|_| panic!("observer bug"))
        .on_iteration_end(|_, _| panic!("observer bug"))
        .on_iteration_finish(|_| panic!("observer bug"))
        .on_finish(|_| panic!("observer bug"))
        .build()
        .unwrap();

    let outcome = ralph.run("Do it").await;
    assert!(outcome.is_verified());
    assert_eq!(outcome.iterations, 2);
}

#[tokio::test]
async fn test_tool_stop_override() {
    use ralph_loop_model::ToolCallRequest;
    use ralph_loop_test_engine::PresetEvent;

    let mut engine = ScriptedEngine::default();
    engine.add_round(PresetRound::with_events([
        PresetEvent::TextDelta("Checking. ".to_owned()),
        PresetEvent::ToolCall(ToolCallRequest {
            id: "1".to_owned(),
            name: "lookup".to_owned(),
            arguments: json!({}),
        }),
        PresetEvent::TextDelta("All set.".to_owned()),
    ]));
    let ralph = builder(&engine)
        .with_tool(LookupTool)
        .with_evaluator(complete_when(|_| true))
        .build()
        .unwrap();

    let outcome = ralph
        .run(
            LoopInput::new("Check")
                .with_tool_stop(ToolStopCondition::StepCountIs(1)),
        )
        .await;
    let generation = outcome.last_result.unwrap();
    assert_eq!(generation.steps, 1);
    assert_eq!(generation.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(outcome.final_text, "Checking. ");
}

#[tokio::test]
async fn test_stream_reissues_final_iteration() {
    let engine = engine_with(&[
        "attempt 1",
        "attempt 2",
        "attempt 3 done",
        "attempt 3 done, streamed",
    ]);
    let starts = Arc::new(AtomicU32::new(0));
    let records = Arc::new(AtomicU32::new(0));
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text.contains("done")))
        .with_max_iterations(5)
        .on_iteration_start({
            let starts = Arc::clone(&starts);
            move |_| {
                starts.fetch_add(1, Ordering::SeqCst);
            }
        })
        .on_iteration_finish({
            let records = Arc::clone(&records);
            move |_| {
                records.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    let mut stream = ralph.stream("Try until done").await;
    assert!(stream.outcome().is_none());
    let mut text = String::new();
    let mut events = vec![];
    while let Some(event) = stream.next_event().await {
        if let RoundEvent::TextDelta(delta) = &event {
            text.push_str(delta);
        }
        events.push(event);
    }
    assert_eq!(text, "attempt 3 done, streamed");
    assert_eq!(
        events.last(),
        Some(&RoundEvent::StepFinished(FinishReason::Stop))
    );
    assert!(stream.is_finished());

    let outcome = stream.finish().await;
    assert!(outcome.is_verified());
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.all_iteration_results.len(), 3);
    assert_eq!(outcome.final_text, "attempt 3 done, streamed");

    let requests = engine.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[..3].iter().all(|req| !req.streamed));
    assert!(requests[3].streamed);
    assert_eq!(requests[3].messages, requests[2].messages);

    // Four rounds started, the discarded rehearsal is not reported.
    assert_eq!(starts.load(Ordering::SeqCst), 4);
    assert_eq!(records.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_stream_reevaluates_final_iteration() {
    // The first attempt says done, but the streamed answer does not.
    let engine = engine_with(&["first", "done", "not quite"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "done"))
        .with_max_iterations(5)
        .build()
        .unwrap();

    let outcome = ralph.stream("Try").await.finish().await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 2);
    let last = outcome.all_iteration_results.last().unwrap();
    assert_eq!(last.generation.text, "not quite");
    assert_eq!(last.verdict, Some(Verdict::incomplete("fix iteration 2")));
}

#[tokio::test]
async fn test_stream_at_max_iterations() {
    let engine = engine_with(&["a", "b", "b streamed"]);
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| false))
        .with_max_iterations(2)
        .build()
        .unwrap();

    let outcome = ralph.stream("Never done").await.finish().await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.all_iteration_results.len(), 2);
    assert_eq!(outcome.final_text, "b streamed");
    assert_eq!(engine.remaining_rounds(), 0);
}

#[tokio::test]
async fn test_stream_aborted_before_streaming() {
    let mut engine = ScriptedEngine::default();
    engine.add_round(PresetRound::failing("boom"));
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|_| true))
        .build()
        .unwrap();

    let mut stream = ralph.stream("Do it").await;
    assert!(stream.is_finished());
    assert_eq!(
        stream.outcome().map(|outcome| outcome.completion_reason),
        Some(CompletionReason::Aborted)
    );
    assert!(stream.next_event().await.is_none());
    let outcome = stream.finish().await;
    assert!(matches!(
        outcome.error,
        Some(LoopError::Generation { iteration: 1, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stream_cancelled_while_draining() {
    let token = CancellationToken::new();
    let mut engine = engine_with(&["done"]);
    engine.add_round(PresetRound::with_events([
        ralph_loop_test_engine::PresetEvent::TextDelta("do".to_owned()),
        ralph_loop_test_engine::PresetEvent::TextDelta("ne".to_owned()),
    ]));
    engine.set_delay(Duration::from_millis(100));
    let ralph = builder(&engine)
        .with_evaluator(complete_when(|text| text == "done"))
        .build()
        .unwrap();

    let mut stream = ralph
        .stream(LoopInput::new("Do it").with_cancellation(token.clone()))
        .await;
    assert_eq!(
        stream.next_event().await,
        Some(RoundEvent::TextDelta("do".to_owned()))
    );
    token.cancel();
    assert!(stream.next_event().await.is_none());

    let outcome = stream.finish().await;
    assert!(matches!(
        outcome.error,
        Some(LoopError::Cancelled { iteration: 1 })
    ));
    assert!(outcome.all_iteration_results.is_empty());
}

#[tokio::test]
async fn test_with_config() {
    let config: LoopConfig = r#"{
        "model": "main",
        "instructions": "Be brief.",
        "maxIterations": 2,
        "evaluator": { "type": "judge-model", "model": "judge" }
    }"#
    .parse()
    .unwrap();
    let engine = engine_with(&["a", "NO, too long", "b", "NO, still long"]);
    let ralph = RalphLoopBuilder::with_engine(engine.clone())
        .with_config(config)
        .build()
        .unwrap();

    let outcome = ralph.run("Summarize").await;
    assert_eq!(outcome.completion_reason, CompletionReason::MaxIterations);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.reason.as_deref(), Some("NO, still long"));

    let requests = engine.requests();
    assert_eq!(requests[0].instructions.as_deref(), Some("Be brief."));
    assert_eq!(requests[1].model, "judge");
    assert!(requests[2].has_user_turn("NO, too long"));
}

#[test]
fn test_configuration_errors() {
    let engine = ScriptedEngine::default();
    let expect_config_error = |builder: RalphLoopBuilder| match builder.build() {
        Err(LoopError::Configuration(_)) => {}
        other => panic!("expected a configuration error, got {other:?}"),
    };

    expect_config_error(
        RalphLoopBuilder::with_engine(engine.clone())
            .with_evaluator(Evaluator::self_judge()),
    );
    expect_config_error(
        RalphLoopBuilder::with_engine(engine.clone())
            .with_model("  ")
            .with_evaluator(Evaluator::self_judge()),
    );
    expect_config_error(RalphLoopBuilder::with_engine(engine.clone()).with_model("main"));
    expect_config_error(
        RalphLoopBuilder::with_engine(engine.clone())
            .with_model("main")
            .with_evaluator(Evaluator::self_judge())
            .with_max_iterations(0),
    );
    expect_config_error(
        RalphLoopBuilder::with_engine(engine.clone())
            .with_model("main")
            .with_evaluator(Evaluator::judge_model("")),
    );
    expect_config_error(
        RalphLoopBuilder::with_engine(engine.clone())
            .with_model("main")
            .with_evaluator(Evaluator::self_judge().with_question("")),
    );

    assert!(
        RalphLoopBuilder::with_engine(engine)
            .with_model("main")
            .with_evaluator(Evaluator::self_judge())
            .build()
            .is_ok()
    );
}
