use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, Timelike, Utc};

use crate::config_file::FileConfig;
use crate::{
    append_transcript, CapabilityContext, CapabilityExecutor, HybridRouter, ReasoningService,
    RouterOutcome, SpeechError, SpeechInput, SpeechOutput, StartupError, ToolCallingSession,
    TranscriptEntry, TriggerTable, Verifier, Heard, GENERIC_APOLOGY,
};

const FATAL_NOTICE: &str = "Sorry sir, I could not start up. Please check the logs.";
const VERIFICATION_NOTICE: &str = "Sorry sir, I could not verify your identity.";
const SPEECH_UNAVAILABLE_NOTICE: &str =
    "Unable to reach speech services. Please check your connection.";
const SPEECH_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopState {
    Initializing,
    Verifying,
    Greeting,
    Listening,
    Terminated,
}

pub(crate) fn greeting_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "Good morning sir, I am Friday. How may I help you?"
    } else if hour < 18 {
        "Good afternoon sir, I am Friday. How may I help you?"
    } else {
        "Hello sir, I am Friday. How may I help you?"
    }
}

/// Router, executor and conversation for one run.
pub(crate) struct Assistant {
    pub(crate) router: HybridRouter,
    pub(crate) executor: CapabilityExecutor,
    pub(crate) session: ToolCallingSession,
}

impl Assistant {
    pub(crate) fn assemble(
        config: &FileConfig,
        running: Arc<AtomicBool>,
        service: Box<dyn ReasoningService>,
    ) -> Self {
        let executor = CapabilityExecutor::new(CapabilityContext::from_config(config, running));
        let session = ToolCallingSession::new(
            service,
            executor.schemas(),
            &config.model.system_instruction,
            config.model.max_tool_rounds,
        );
        let router = HybridRouter::new(&config.activation_word, TriggerTable::with_defaults());
        Self {
            router,
            executor,
            session,
        }
    }

    /// Route one utterance; nothing escapes as a panic.
    pub(crate) fn handle(&mut self, utterance: &str) -> RouterOutcome {
        let Self {
            router,
            executor,
            session,
        } = self;
        catch_unwind(AssertUnwindSafe(|| router.route(utterance, executor, session)))
            .unwrap_or_else(|_| {
                tracing::error!("routing panicked");
                RouterOutcome::LocalReply(GENERIC_APOLOGY.to_string())
            })
    }
}

pub(crate) type ServiceFactory =
    Box<dyn FnOnce(&FileConfig) -> Result<Box<dyn ReasoningService>, StartupError> + Send>;

#[derive(Debug, Default)]
pub(crate) struct LoopSummary {
    pub(crate) utterances: usize,
    pub(crate) quota_used: u64,
    pub(crate) startup_error: Option<String>,
}

/// Initializing → Verifying → Greeting → Listening → Terminated.
pub(crate) struct SessionLoop {
    config: FileConfig,
    running: Arc<AtomicBool>,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    verifier: Box<dyn Verifier>,
    service: Option<ServiceFactory>,
    state: LoopState,
}

impl SessionLoop {
    pub(crate) fn new(
        config: FileConfig,
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        verifier: Box<dyn Verifier>,
        service: ServiceFactory,
    ) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            input,
            output,
            verifier,
            service: Some(service),
            state: LoopState::Initializing,
        }
    }

    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "session loop");
        self.state = next;
    }

    fn terminate(&mut self, notice: &str, err: StartupError, summary: &mut LoopSummary) {
        tracing::error!(%err, "session loop cannot start");
        self.output.speak(notice);
        summary.startup_error = Some(err.to_string());
        self.running.store(false, Ordering::SeqCst);
        self.transition(LoopState::Terminated);
    }

    pub(crate) fn run(mut self) -> LoopSummary {
        let mut summary = LoopSummary::default();

        let service = match self.service.take() {
            Some(factory) => factory(&self.config),
            None => Err(StartupError::FatalInitialization(
                "reasoning service already consumed".to_string(),
            )),
        };
        let service = match service {
            Ok(service) => service,
            Err(err) => {
                self.terminate(FATAL_NOTICE, err, &mut summary);
                return summary;
            }
        };
        let mut assistant = Assistant::assemble(&self.config, self.running_flag(), service);

        self.transition(LoopState::Verifying);
        if let Err(err) = self.verifier.verify() {
            self.terminate(VERIFICATION_NOTICE, err, &mut summary);
            return summary;
        }

        self.transition(LoopState::Greeting);
        self.output.speak(greeting_for_hour(Local::now().hour()));

        self.transition(LoopState::Listening);
        let timeout = Duration::from_secs(self.config.speech.listen_timeout_secs.max(1));
        let transcript_dir: Option<PathBuf> =
            self.config.log.transcript.then(|| self.config.log.dir.clone());

        while self.running.load(Ordering::SeqCst) {
            let utterance = match self.input.next_utterance(timeout) {
                Ok(Heard::Utterance(text)) => text,
                Ok(Heard::NoInput) | Err(SpeechError::Unrecognized) => continue,
                Ok(Heard::EndOfInput) => {
                    tracing::info!(input = self.input.name(), "speech input closed");
                    break;
                }
                Err(SpeechError::Unavailable(reason)) => {
                    tracing::warn!(%reason, "speech input unavailable");
                    self.output.speak(SPEECH_UNAVAILABLE_NOTICE);
                    thread::sleep(SPEECH_RETRY_DELAY);
                    continue;
                }
            };

            summary.utterances += 1;
            let outcome = assistant.handle(&utterance);
            tracing::info!(route = outcome.label(), "utterance routed");
            if let Some(reply) = outcome.speech() {
                self.output.speak(reply);
            }
            if let Some(dir) = &transcript_dir {
                let entry = TranscriptEntry {
                    ts_utc: Utc::now().timestamp(),
                    route: outcome.label().to_string(),
                    utterance,
                    reply: outcome.speech().map(str::to_string),
                };
                if let Err(err) = append_transcript(dir, &entry) {
                    tracing::warn!(%err, "failed to append transcript");
                }
            }
        }

        summary.quota_used = assistant.session.quota_used();
        self.running.store(false, Ordering::SeqCst);
        self.transition(LoopState::Terminated);
        tracing::info!(
            utterances = summary.utterances,
            quota_used = summary.quota_used,
            "session loop terminated"
        );
        summary
    }
}

/// Owner side of the worker thread running a `SessionLoop`.
pub(crate) struct WorkerHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<LoopSummary>,
}

impl WorkerHandle {
    #[cfg(test)]
    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Waits for the loop to finish on its own (sleep command or end of input).
    pub(crate) fn join(self) -> Result<LoopSummary, String> {
        self.join
            .join()
            .map_err(|_| "session worker panicked".to_string())
    }

    #[cfg(test)]
    pub(crate) fn stop_and_join(self) -> Result<LoopSummary, String> {
        self.running.store(false, Ordering::SeqCst);
        self.join()
    }
}

pub(crate) fn spawn_worker(session_loop: SessionLoop) -> Result<WorkerHandle, std::io::Error> {
    let running = session_loop.running_flag();
    let join = thread::Builder::new()
        .name("friday-session".to_string())
        .spawn(move || session_loop.run())?;
    Ok(WorkerHandle { running, join })
}
