//! Pull-based run driver.
//!
//! A [`Run`] is a stream of [`Step`]s. Each poll advances the agent only as
//! far as the next step; dropping the run drops every in-flight model stream
//! and tool task with it.

use crate::agent::{Agent, PhaseEvent, RESPONSE_STAGE, SELECTING_SKILL_STAGE};
use crate::prompt::MAX_ROUNDS_WARNING;
use crate::step::Step;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use rustedlens_core::event::{DomainEvent, FinishReason};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};
use tracing::{info, warn};

/// Header of the step that ends a run on budget exhaustion.
pub const MAX_ROUNDS_MESSAGE: &str = "Max rounds reached";

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Done,
}

#[derive(Default)]
struct Progress {
    rounds: AtomicU32,
    done: AtomicBool,
}

/// An in-progress agent run.
pub struct Run<'a> {
    steps: Pin<Box<dyn Stream<Item = Step> + Send + 'a>>,
    progress: Arc<Progress>,
    max_rounds: u32,
}

impl<'a> Run<'a> {
    pub(crate) fn new(agent: &'a mut Agent) -> Self {
        let progress = Arc::new(Progress::default());
        let max_rounds = agent.max_rounds();
        Self {
            steps: Box::pin(drive(agent, Arc::clone(&progress))),
            progress,
            max_rounds,
        }
    }

    pub fn state(&self) -> RunState {
        if self.progress.done.load(Ordering::SeqCst) {
            RunState::Done
        } else {
            RunState::Running
        }
    }

    /// Rounds started so far. The closing selection pass after the budget
    /// runs out is not a round, so this never exceeds
    /// [`max_rounds`](Self::max_rounds) and matches `RunFinished::rounds`.
    pub fn rounds(&self) -> u32 {
        self.progress.rounds.load(Ordering::SeqCst)
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }
}

impl Stream for Run<'_> {
    type Item = Step;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Step>> {
        self.steps.as_mut().poll_next(cx)
    }
}

fn drive(agent: &mut Agent, progress: Arc<Progress>) -> impl Stream<Item = Step> + Send + '_ {
    async_stream::stream! {
        let max_rounds = agent.max_rounds();
        info!(max_rounds, "Run started");

        loop {
            let round = progress.rounds.load(Ordering::SeqCst) + 1;
            let mut last = agent.memory().latest();

            if round > max_rounds {
                progress.done.store(true, Ordering::SeqCst);
                warn!(max_rounds, "Round budget exhausted");

                // One last selection pass so memory records the forced stage.
                last.message.push_str(MAX_ROUNDS_WARNING);
                {
                    let phase = agent.select_skill_and_tools(last);
                    pin_mut!(phase);
                    while phase.next().await.is_some() {}
                }

                agent.publish(DomainEvent::RunFinished {
                    rounds: max_rounds,
                    reason: FinishReason::MaxRounds,
                    timestamp: Utc::now(),
                });
                let latest = agent.memory().latest();
                yield Step::finished(
                    RESPONSE_STAGE,
                    format!("{MAX_ROUNDS_MESSAGE}\n\n{}", latest.message),
                    Vec::new(),
                );
                break;
            }

            progress.rounds.store(round, Ordering::SeqCst);
            info!(round, "Round started");
            agent.publish(DomainEvent::RoundStarted {
                round,
                timestamp: Utc::now(),
            });

            let mut selection = String::new();
            let mut context = None;
            {
                let phase = agent.select_skill_and_tools(last);
                pin_mut!(phase);
                while let Some(event) = phase.next().await {
                    match event {
                        PhaseEvent::Chunk(text) => {
                            selection.push_str(&text);
                            yield Step::progress(SELECTING_SKILL_STAGE, selection.clone());
                        }
                        PhaseEvent::Finished(round_context) => context = Some(round_context),
                    }
                }
            }
            let context = context.unwrap_or_default();

            yield Step::finished(
                SELECTING_SKILL_STAGE,
                selection,
                context.generated_images.clone(),
            );

            let stage = context.snapshot.stage.clone();
            let skill = context.snapshot.skill_selection.clone();
            agent.publish(DomainEvent::SkillSelected {
                round,
                skill: skill.clone(),
                stage: stage.clone(),
                tool_calls: context.decision.as_ref().map_or(0, |d| d.tool_list.len()),
                timestamp: Utc::now(),
            });

            let skill_text = agent.skills().skill_text(&skill);
            if skill_text.is_empty() {
                warn!(skill = %skill, "No instructions for selected skill");
            }

            let mut streamed = String::new();
            let mut answer = String::new();
            {
                let phase = agent.execute_skill(context, skill_text);
                pin_mut!(phase);
                while let Some(event) = phase.next().await {
                    match event {
                        PhaseEvent::Chunk(text) => {
                            streamed.push_str(&text);
                            yield Step::progress(stage.clone(), streamed.clone());
                        }
                        PhaseEvent::Finished(result) => answer = result,
                    }
                }
            }

            yield Step::finished(stage.clone(), answer, Vec::new());

            if stage == RESPONSE_STAGE {
                progress.done.store(true, Ordering::SeqCst);
                info!(rounds = round, "Run finished");
                agent.publish(DomainEvent::RunFinished {
                    rounds: round,
                    reason: FinishReason::Responded,
                    timestamp: Utc::now(),
                });
                break;
            }
        }
    }
}
