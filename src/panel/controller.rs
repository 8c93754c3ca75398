//! Feedback Loop Controller.
//!
//! A session walks an explicit state machine:
//!
//! ```text
//! Init -> Generating(1) -> Critiquing(1) -> Generating(2) -> ... -> Accepted | Exhausted | Cancelled
//! ```
//!
//! Transient capability failures are retried inside the current state and never consume an
//! iteration. Policy violations and other fatal capability failures abort the session. Every
//! attempt, successful or not, is written to the artifact sink as a [`StepRecord`] before the
//! controller reacts to its outcome.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use image::RgbaImage;
use serde_json::{Value, json};

use crate::{
    artifacts::store::{ArtifactSink, StepOutcome, StepRecord, new_session_id, now_rfc3339},
    assemble::lineup::{PanelInputs, assemble_inputs},
    foundation::{
        config::{FeedbackConfig, ForgeConfig},
        error::{ForgeError, ForgeResult},
    },
    panel::{
        cancel::CancelToken,
        capability::{
            CRITIC, CapabilityError, Critic, Critique, CritiqueRequest, GENERATOR, GeneratedImage,
            Generator, GeneratorRequest,
        },
        model::{Candidate, IterationRecord, PanelRequest, PanelResult, Termination, Verdict},
        prompt::{
            build_critique_prompt, build_generation_prompt, summarize_candidate,
            unreferenced_names,
        },
    },
};

/// Feedback substituted when a critic rejects without saying why.
pub const MISSING_FEEDBACK: &str =
    "The critic rejected this panel without specific feedback; improve overall fidelity to the scene.";

/// Where a session currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Generating { iteration: u32 },
    Critiquing { iteration: u32 },
    Accepted,
    Exhausted,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Exhausted | Self::Cancelled | Self::Failed
        )
    }
}

/// One panel attempt driving a generator and a critic.
///
/// Sessions are independent: each owns its capabilities, sink and history, so several can run
/// side by side on different threads.
pub struct PanelSession<G, C, A> {
    generator: G,
    critic: C,
    sink: A,
    config: ForgeConfig,
    cancel: CancelToken,
    session_id: String,
    state: SessionState,
    history: Vec<IterationRecord>,
}

impl<G, C, A> PanelSession<G, C, A>
where
    G: Generator,
    C: Critic,
    A: ArtifactSink,
{
    pub fn new(config: ForgeConfig, generator: G, critic: C, sink: A) -> Self {
        Self {
            generator,
            critic,
            sink,
            config,
            cancel: CancelToken::new(),
            session_id: new_session_id(),
            state: SessionState::Init,
            history: Vec::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Completed iterations so far, oldest first.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Give back the artifact sink (for inspection after a run).
    pub fn into_sink(self) -> A {
        self.sink
    }

    /// Run the session to a terminal state.
    ///
    /// Budget exhaustion is not an error: it returns a result with `accepted == false` and the
    /// last candidate. Cancellation returns the same shape once at least one iteration finished,
    /// and [`ForgeError::Cancelled`] otherwise.
    #[tracing::instrument(skip_all, fields(session = %self.session_id))]
    pub fn run(&mut self, request: &PanelRequest) -> ForgeResult<PanelResult> {
        if self.state != SessionState::Init {
            return Err(ForgeError::validation(
                "a panel session can only be run once",
            ));
        }
        match self.run_inner(request) {
            Ok(result) => Ok(result),
            Err(err) => {
                if !matches!(err, ForgeError::Cancelled) {
                    self.state = SessionState::Failed;
                }
                self.write_metadata(request, None, Some(&err));
                Err(err)
            }
        }
    }

    fn run_inner(&mut self, request: &PanelRequest) -> ForgeResult<PanelResult> {
        request.validate()?;
        self.config.validate()?;

        let missing = unreferenced_names(
            &request.scene_prompt,
            request.characters.iter().map(|c| c.name.as_str()),
        );
        if !missing.is_empty() {
            tracing::warn!(?missing, "characters not mentioned in the scene prompt");
        }

        let inputs = assemble_inputs(request, &self.config.lineup)?;
        self.save_inputs(request, &inputs)?;
        tracing::info!(
            characters = request.characters.len(),
            location = inputs.location.is_some(),
            aspect = %request.aspect_ratio,
            max_iterations = request.max_iterations,
            "panel session started"
        );

        let mut termination = Termination::Exhausted;
        for iteration in 1..=request.max_iterations {
            if self.cancel.is_cancelled() {
                tracing::warn!(iteration, "cancellation requested");
                termination = Termination::Cancelled;
                break;
            }

            self.state = SessionState::Generating { iteration };
            let generated = self.generate(request, &inputs, iteration)?;
            let image = Arc::new(generated.image);
            self.sink
                .save_image(&self.session_id, &format!("iter{iteration}"), &image)?;
            let summary = summarize_candidate(&image, generated.description.as_deref());

            self.state = SessionState::Critiquing { iteration };
            let critique = self.critique(request, &image, iteration)?;
            let feedback = normalize_feedback(critique.verdict, critique.feedback);
            tracing::info!(iteration, verdict = ?critique.verdict, "critique received");

            self.history.push(IterationRecord {
                index: iteration,
                candidate: Candidate { image, summary },
                verdict: critique.verdict,
                feedback,
            });

            if critique.verdict.is_accepted() {
                termination = Termination::Accepted;
                break;
            }
        }

        let Some(last) = self.history.last() else {
            self.state = SessionState::Cancelled;
            return Err(ForgeError::Cancelled);
        };

        self.state = match termination {
            Termination::Accepted => SessionState::Accepted,
            Termination::Exhausted => SessionState::Exhausted,
            Termination::Cancelled => SessionState::Cancelled,
        };
        let result = PanelResult {
            session_id: self.session_id.clone(),
            final_image: last.candidate.image.clone(),
            iterations_used: self.history.len() as u32,
            accepted: termination == Termination::Accepted,
            termination,
            history: self.history.clone(),
        };
        tracing::info!(
            iterations = result.iterations_used,
            accepted = result.accepted,
            ?termination,
            "panel session finished"
        );
        self.write_metadata(request, Some(&result), None);
        Ok(result)
    }

    fn save_inputs(&mut self, request: &PanelRequest, inputs: &PanelInputs) -> ForgeResult<()> {
        // The slot index keeps labels distinct when names sanitize to the same text.
        for (slot, c) in request.characters.iter().enumerate() {
            self.sink.save_image(
                &self.session_id,
                &format!("{}_{}_reference", slot + 1, c.name),
                &c.processed_image,
            )?;
        }
        if let Some(lineup) = &inputs.lineup {
            self.sink
                .save_image(&self.session_id, "characters_lineup", &lineup.image)?;
        }
        Ok(())
    }

    fn generate(
        &mut self,
        request: &PanelRequest,
        inputs: &PanelInputs,
        iteration: u32,
    ) -> ForgeResult<GeneratedImage> {
        let prompt = build_generation_prompt(request, inputs, &self.history);
        let timeout = self.config.feedback.call_timeout();
        let lineup = inputs.lineup.as_ref().map(|l| l.image.as_ref());
        let location = inputs.location.as_ref().map(|l| l.image.as_ref());
        let logged_request = json!({
            "prompt": prompt,
            "has_lineup": lineup.is_some(),
            "has_location": location.is_some(),
            "timeout_ms": self.config.feedback.call_timeout_ms,
        });

        let step = StepContext {
            session_id: &self.session_id,
            capability: GENERATOR,
            iteration,
            request: &logged_request,
        };
        let generator = &mut self.generator;
        run_step(
            &mut self.sink,
            &self.config.feedback,
            step,
            |attempt| {
                let out = generator.generate(&GeneratorRequest {
                    iteration,
                    attempt,
                    prompt: &prompt,
                    lineup,
                    location,
                    aspect_ratio: request.aspect_ratio,
                    timeout,
                })?;
                if out.image.width() == 0 || out.image.height() == 0 {
                    return Err(CapabilityError::fatal("generator returned an empty image"));
                }
                Ok(out)
            },
            |out| {
                json!({
                    "width": out.image.width(),
                    "height": out.image.height(),
                    "description": out.description,
                    "raw": out.raw_response,
                })
            },
        )
    }

    fn critique(
        &mut self,
        request: &PanelRequest,
        candidate: &RgbaImage,
        iteration: u32,
    ) -> ForgeResult<Critique> {
        let prompt = build_critique_prompt(request, iteration);
        let timeout = self.config.feedback.call_timeout();
        let logged_request = json!({
            "prompt": prompt,
            "candidate": summarize_candidate(candidate, None),
            "timeout_ms": self.config.feedback.call_timeout_ms,
        });

        let step = StepContext {
            session_id: &self.session_id,
            capability: CRITIC,
            iteration,
            request: &logged_request,
        };
        let critic = &mut self.critic;
        run_step(
            &mut self.sink,
            &self.config.feedback,
            step,
            |attempt| {
                critic.critique(&CritiqueRequest {
                    iteration,
                    attempt,
                    candidate,
                    prompt: &prompt,
                    timeout,
                })
            },
            |c| {
                json!({
                    "verdict": c.verdict,
                    "feedback": c.feedback,
                    "raw": c.raw_response,
                })
            },
        )
    }

    fn write_metadata(
        &mut self,
        request: &PanelRequest,
        result: Option<&PanelResult>,
        error: Option<&ForgeError>,
    ) {
        let iterations: Vec<Value> = self
            .history
            .iter()
            .map(|r| {
                json!({
                    "index": r.index,
                    "summary": r.candidate.summary,
                    "verdict": r.verdict,
                    "feedback": r.feedback,
                })
            })
            .collect();
        let metadata = json!({
            "session_id": self.session_id,
            "scene_prompt": request.scene_prompt,
            "aspect_ratio": request.aspect_ratio,
            "max_iterations": request.max_iterations,
            "characters": request
                .characters
                .iter()
                .map(|c| json!({ "name": c.name, "height_cm": c.height_cm }))
                .collect::<Vec<_>>(),
            "has_location": request.location.is_some(),
            "iterations": iterations,
            "iterations_used": self.history.len(),
            "accepted": result.is_some_and(|r| r.accepted),
            "termination": result.map(|r| r.termination),
            "error": error.map(|e| e.to_string()),
        });
        if let Err(e) = self.sink.write_metadata(&self.session_id, &metadata) {
            tracing::warn!(error = %e, "failed to write session metadata");
        }
    }
}

/// Run one panel session with a fresh session id.
pub fn generate_panel<G, C, A>(
    request: &PanelRequest,
    config: &ForgeConfig,
    generator: G,
    critic: C,
    sink: A,
    cancel: &CancelToken,
) -> ForgeResult<PanelResult>
where
    G: Generator,
    C: Critic,
    A: ArtifactSink,
{
    PanelSession::new(config.clone(), generator, critic, sink)
        .with_cancel_token(cancel.clone())
        .run(request)
}

struct StepContext<'a> {
    session_id: &'a str,
    capability: &'static str,
    iteration: u32,
    request: &'a Value,
}

/// Call a capability with bounded retries for transient failures, logging every attempt.
fn run_step<T>(
    sink: &mut impl ArtifactSink,
    policy: &FeedbackConfig,
    step: StepContext<'_>,
    mut call: impl FnMut(u32) -> Result<T, CapabilityError>,
    describe: impl Fn(&T) -> Value,
) -> ForgeResult<T> {
    let max_attempts = policy.max_transient_retries.saturating_add(1);
    let mut attempt = 1u32;
    loop {
        let started = Instant::now();
        let result = call(attempt);
        let elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        let (outcome, response, error) = match &result {
            Ok(v) => (StepOutcome::Ok, Some(describe(v)), None),
            Err(e) => (step_outcome(e), None, Some(e.to_string())),
        };
        let record = StepRecord {
            session_id: step.session_id.to_string(),
            step: StepRecord::step_name(step.capability, step.iteration, attempt),
            iteration: step.iteration,
            attempt,
            capability: step.capability.to_string(),
            timestamp: now_rfc3339(),
            elapsed_ms,
            request: step.request.clone(),
            response,
            outcome,
            error,
        };
        if let Err(e) = sink.record_step(&record) {
            tracing::warn!(step = %record.step, error = %e, "failed to persist step record");
        }

        match result {
            Ok(v) => return Ok(v),
            Err(CapabilityError::Transient { kind, message }) if attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    capability = step.capability,
                    iteration = step.iteration,
                    attempt,
                    ?kind,
                    %message,
                    "transient failure, retrying"
                );
                sleep_unless_zero(delay);
                attempt += 1;
            }
            Err(CapabilityError::Transient { message, .. }) => {
                return Err(ForgeError::TransientCapability {
                    capability: step.capability,
                    attempts: attempt,
                    message,
                });
            }
            Err(CapabilityError::PolicyViolation(message)) => {
                return Err(ForgeError::policy_violation(step.capability, message));
            }
            Err(CapabilityError::Fatal(message)) => {
                return Err(ForgeError::capability(step.capability, message));
            }
        }
    }
}

fn step_outcome(err: &CapabilityError) -> StepOutcome {
    match err {
        CapabilityError::Transient { .. } => StepOutcome::Transient,
        CapabilityError::PolicyViolation(_) => StepOutcome::PolicyViolation,
        CapabilityError::Fatal(_) => StepOutcome::Error,
    }
}

fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

/// Rejections always carry feedback; acceptances never do.
fn normalize_feedback(verdict: Verdict, feedback: Option<String>) -> Option<String> {
    match verdict {
        Verdict::Accepted => None,
        Verdict::Rejected => Some(
            feedback
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| MISSING_FEEDBACK.to_string()),
        ),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/panel/controller.rs"]
mod tests;
