//! Session actor
//!
//! One task owns the [`SessionState`] and the adapters. User triggers,
//! adapter callbacks, timer expiries and dispatch results all arrive on a
//! single channel and are applied one at a time, so no two transitions ever
//! interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;

use super::machine::{Effect, Event, Machine, Rejection, Step};
use super::state::SessionState;
use crate::config::Config;
use crate::dispatch::CommandDispatcher;
use crate::error::DispatchError;
use crate::voice::{
    InputEvent, InputSink, Locale, OutputEvent, OutputSink, SpeechInput, SpeechInputFactory,
    SpeechOutput, VoiceParams,
};
use crate::{Error, Result};

enum Message {
    Event {
        event: Event,
        reply: Option<oneshot::Sender<Option<Rejection>>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Running session; see [`Session::spawn`]
pub struct Session {
    machine: Machine,
    state: SessionState,
    input_factory: Arc<dyn SpeechInputFactory>,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    dispatcher: Arc<dyn CommandDispatcher>,
    dispatch_timeout: Duration,
    tx: mpsc::UnboundedSender<Message>,
    state_tx: watch::Sender<SessionState>,
    tasks: JoinSet<()>,
}

impl Session {
    /// Start a session task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &Config,
        input_factory: Arc<dyn SpeechInputFactory>,
        output: Box<dyn SpeechOutput>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> SessionHandle {
        let state = SessionState::new(config.language.clone(), config.voice);
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state.clone());

        let input = input_factory.create(&state.language, input_sink(&tx, state.input_generation));

        let session = Self {
            machine: Machine::from_config(config),
            state,
            input_factory,
            input,
            output,
            dispatcher,
            dispatch_timeout: config.dispatch_timeout,
            tx: tx.clone(),
            state_tx,
            tasks: JoinSet::new(),
        };

        tracing::info!(
            language = %config.language,
            endpoint = %config.endpoint,
            "voice command session started"
        );
        tokio::spawn(session.run(rx));

        SessionHandle { tx, state_rx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Event { event, reply } => {
                    let rejection = self.apply(event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(rejection);
                    }
                }
                Message::Shutdown(ack) => {
                    self.shutdown().await;
                    let _ = ack.send(());
                    return;
                }
            }

            while self.tasks.try_join_next().is_some() {}
        }
    }

    async fn apply(&mut self, event: Event) -> Option<Rejection> {
        let before = self.state.phase;
        let Step {
            state,
            effects,
            rejection,
        } = self.machine.step(&self.state, event);

        if let Some(reason) = rejection {
            tracing::debug!(phase = ?before, ?reason, "event not applied");
        } else if state.phase != before {
            tracing::debug!(from = ?before, to = ?state.phase, "session transition");
        }
        if let Some(error) = state.error.as_ref().filter(|_| state.error != self.state.error) {
            tracing::warn!(error = %error, "session error");
        }

        self.state = state;
        for effect in effects {
            self.perform(effect).await;
        }

        // Subscribers only see a state once its effects have been carried out
        let snapshot = &self.state;
        self.state_tx.send_if_modified(|published| {
            if published == snapshot {
                false
            } else {
                published.clone_from(snapshot);
                true
            }
        });

        rejection
    }

    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::CancelSpeech => self.output.cancel().await,
            Effect::StartCapture { locale } => {
                if let Err(e) = self.input.start(&locale).await {
                    self.inject(Event::Input {
                        generation: self.state.input_generation,
                        event: InputEvent::Error(e),
                    });
                }
            }
            Effect::StopCapture => self.input.stop().await,
            Effect::RebuildInput { generation, locale } => {
                self.input.stop().await;
                self.input = self
                    .input_factory
                    .create(&locale, input_sink(&self.tx, generation));
                tracing::debug!(generation, language = %locale, "recognizer rebuilt");
            }
            Effect::Dispatch { attempt, command } => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let timeout = self.dispatch_timeout;
                let tx = self.tx.clone();

                self.tasks.spawn(async move {
                    let result = tokio::time::timeout(timeout, dispatcher.dispatch(&command))
                        .await
                        .unwrap_or(Err(DispatchError::TimedOut));
                    send(&tx, Event::DispatchResolved { attempt, result });
                });
            }
            Effect::ScheduleSpeak { attempt, delay } => {
                self.after(delay, Event::SpeakDue { attempt });
            }
            Effect::ArmListenTimeout { attempt, timeout } => {
                self.after(timeout, Event::ListenTimedOut { attempt });
            }
            Effect::Speak { utterance, request } => {
                let sink = output_sink(&self.tx, utterance);
                if let Err(e) = self.output.speak(request, sink).await {
                    self.inject(Event::Output {
                        utterance,
                        event: OutputEvent::Error(e),
                    });
                }
            }
        }
    }

    fn after(&mut self, delay: Duration, event: Event) {
        let tx = self.tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            send(&tx, event);
        });
    }

    fn inject(&self, event: Event) {
        send(&self.tx, event);
    }

    async fn shutdown(&mut self) {
        self.tasks.abort_all();
        self.input.stop().await;
        self.output.cancel().await;
        tracing::info!("voice command session stopped");
    }
}

fn send(tx: &mpsc::UnboundedSender<Message>, event: Event) {
    let _ = tx.send(Message::Event { event, reply: None });
}

fn input_sink(tx: &mpsc::UnboundedSender<Message>, generation: u64) -> InputSink {
    let tx = tx.clone();
    InputSink::new(move |event| send(&tx, Event::Input { generation, event }))
}

fn output_sink(tx: &mpsc::UnboundedSender<Message>, utterance: u64) -> OutputSink {
    let tx = tx.clone();
    OutputSink::new(move |event| send(&tx, Event::Output { utterance, event }))
}

/// Cloneable handle to a running session
///
/// Trigger methods resolve once the event has been applied. They return the
/// reason when the session refused or ignored it, and `Error::SessionClosed`
/// once the session has shut down.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    async fn trigger(&self, event: Event) -> Result<Option<Rejection>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Event {
                event,
                reply: Some(reply),
            })
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Begin a voice capture, interrupting any reply being spoken
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn start_listening(&self) -> Result<Option<Rejection>> {
        self.trigger(Event::StartListening).await
    }

    /// End the current capture early
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn stop_listening(&self) -> Result<Option<Rejection>> {
        self.trigger(Event::StopListening).await
    }

    /// Dispatch a typed command
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn submit(&self, text: impl Into<String>) -> Result<Option<Rejection>> {
        self.trigger(Event::Submit(text.into())).await
    }

    /// Stop the reply being spoken
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn stop_speaking(&self) -> Result<Option<Rejection>> {
        self.trigger(Event::StopSpeaking).await
    }

    /// Speak the last textual reply again
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn replay(&self) -> Result<Option<Rejection>> {
        self.trigger(Event::Replay).await
    }

    /// Switch recognition and synthesis language
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn change_language(&self, locale: Locale) -> Result<Option<Rejection>> {
        self.trigger(Event::ChangeLanguage(locale)).await
    }

    /// Replace the voice parameters
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn set_voice_params(&self, params: VoiceParams) -> Result<Option<Rejection>> {
        self.trigger(Event::SetVoiceParams(params)).await
    }

    /// Restore the reset voice parameters
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn reset_voice_params(&self) -> Result<Option<Rejection>> {
        self.trigger(Event::ResetVoiceParams).await
    }

    /// Change only the speech rate
    ///
    /// An out-of-range value is rejected and recorded on the session.
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn set_rate(&self, rate: f32) -> Result<Option<Rejection>> {
        self.trigger(Event::SetRate(rate)).await
    }

    /// Change only the pitch
    ///
    /// An out-of-range value is rejected and recorded on the session.
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn set_pitch(&self, pitch: f32) -> Result<Option<Rejection>> {
        self.trigger(Event::SetPitch(pitch)).await
    }

    /// Change only the volume
    ///
    /// An out-of-range value is rejected and recorded on the session.
    ///
    /// # Errors
    ///
    /// Returns error if the session has shut down
    pub async fn set_volume(&self, volume: f32) -> Result<Option<Rejection>> {
        self.trigger(Event::SetVolume(volume)).await
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the state satisfies `predicate`
    ///
    /// # Errors
    ///
    /// Returns error if the session shuts down first
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(state.clone())
    }

    /// Stop capture and playback, then end the session
    ///
    /// # Errors
    ///
    /// Returns error if the session had already shut down
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown(ack))
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("phase", &self.state_rx.borrow().phase)
            .finish_non_exhaustive()
    }
}
