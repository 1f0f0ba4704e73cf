//! Pure session transitions
//!
//! `Machine::step` maps `(state, event)` to the next state plus the effects
//! the runtime must perform, in order. Nothing here touches an adapter.
//!
//! Capture and playback must never overlap: a microphone open while the
//! speaker is playing picks up the assistant's own voice.

use std::time::Duration;

use crate::config::{Config, Phrases};
use crate::dispatch::Reply;
use crate::error::{DispatchError, RecognitionError, SessionError, ValidationError};
use crate::voice::{InputEvent, Locale, OutputEvent, SpeechRequest, VoiceParams};

use super::state::{InputMethod, Phase, SessionState, StructuredResult};

/// Something that happened to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// User asked to start voice capture
    StartListening,
    /// User asked to end voice capture early
    StopListening,
    /// User typed a command
    Submit(String),
    /// User asked to stop playback
    StopSpeaking,
    /// User asked to hear the last reply again
    Replay,
    /// User picked another language
    ChangeLanguage(Locale),
    /// User adjusted voice parameters
    SetVoiceParams(VoiceParams),
    /// User restored default voice parameters
    ResetVoiceParams,
    /// User changed only the speaking rate
    SetRate(f32),
    /// User changed only the pitch
    SetPitch(f32),
    /// User changed only the volume
    SetVolume(f32),
    /// Recognizer event, tagged with the recognizer generation
    Input {
        /// Recognizer instance that emitted the event
        generation: u64,
        /// The event
        event: InputEvent,
    },
    /// Dispatch finished
    DispatchResolved {
        /// Attempt the dispatch belonged to
        attempt: u64,
        /// Routed reply or failure
        result: Result<Reply, DispatchError>,
    },
    /// Speak delay elapsed
    SpeakDue {
        /// Attempt the delay belonged to
        attempt: u64,
    },
    /// Recognition timeout elapsed
    ListenTimedOut {
        /// Attempt the timeout belonged to
        attempt: u64,
    },
    /// Synthesizer event, tagged with the utterance id
    Output {
        /// Utterance that emitted the event
        utterance: u64,
        /// The event
        event: OutputEvent,
    },
}

/// Work the runtime performs after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Stop playback
    CancelSpeech,
    /// Begin a capture on the current recognizer
    StartCapture {
        /// Capture locale
        locale: Locale,
    },
    /// End the current capture early
    StopCapture,
    /// Tear down the recognizer and build a new one
    RebuildInput {
        /// Generation of the new recognizer
        generation: u64,
        /// Locale it is bound to
        locale: Locale,
    },
    /// Send a command to the webhook
    Dispatch {
        /// Attempt id echoed back in `DispatchResolved`
        attempt: u64,
        /// Command text
        command: String,
    },
    /// Fire `SpeakDue` after `delay`
    ScheduleSpeak {
        /// Attempt id echoed back
        attempt: u64,
        /// Delay
        delay: Duration,
    },
    /// Fire `ListenTimedOut` after `timeout`
    ArmListenTimeout {
        /// Attempt id echoed back
        attempt: u64,
        /// Timeout
        timeout: Duration,
    },
    /// Play an utterance
    Speak {
        /// Utterance id echoed back in `Output`
        utterance: u64,
        /// What to say
        request: SpeechRequest,
    },
}

/// Why an event changed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not allowed in the current phase
    Busy(Phase),
    /// Typed command empty after trimming
    EmptyCommand,
    /// Final transcript empty after trimming
    EmptyTranscript,
    /// Event from a torn-down recognizer, canceled utterance or old attempt
    Stale,
    /// No textual reply to replay
    NothingToReplay,
    /// Voice parameter outside its accepted range
    InvalidParameter,
    /// Partial or informational event
    Informational,
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// State after the event
    pub state: SessionState,
    /// Effects to perform, in order
    pub effects: Vec<Effect>,
    /// Set when the event was refused or dropped
    pub rejection: Option<Rejection>,
}

impl Step {
    fn applied(state: SessionState, effects: Vec<Effect>) -> Self {
        Self {
            state,
            effects,
            rejection: None,
        }
    }

    fn rejected(state: SessionState, rejection: Rejection) -> Self {
        Self {
            state,
            effects: Vec::new(),
            rejection: Some(rejection),
        }
    }
}

/// Transition function with its fixed settings
#[derive(Debug, Clone)]
pub struct Machine {
    phrases: Phrases,
    speak_delay: Duration,
    recognition_timeout: Duration,
}

impl Machine {
    /// Create a machine
    #[must_use]
    pub const fn new(phrases: Phrases, speak_delay: Duration, recognition_timeout: Duration) -> Self {
        Self {
            phrases,
            speak_delay,
            recognition_timeout,
        }
    }

    /// Create a machine from session configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.phrases.clone(),
            config.speak_delay,
            config.recognition_timeout,
        )
    }

    /// Compute the next state for `event`
    #[must_use]
    pub fn step(&self, state: &SessionState, event: Event) -> Step {
        let mut next = state.clone();

        match event {
            Event::StartListening => self.start_listening(next),
            Event::StopListening => {
                if next.phase == Phase::Listening {
                    Step::applied(next, vec![Effect::StopCapture])
                } else {
                    Step::rejected(next, Rejection::Busy(state.phase))
                }
            }
            Event::Submit(text) => Self::submit(next, &text),
            Event::StopSpeaking => {
                if next.phase == Phase::Speaking {
                    next.phase = Phase::Idle;
                    Step::applied(next, vec![Effect::CancelSpeech])
                } else {
                    Step::rejected(next, Rejection::Busy(state.phase))
                }
            }
            Event::Replay => Self::replay(next),
            Event::ChangeLanguage(locale) => {
                next.language = locale.clone();
                next.input_generation += 1;
                if next.phase == Phase::Listening {
                    next.phase = Phase::Idle;
                    next.error = Some(SessionError::Recognition(RecognitionError::Interrupted));
                }
                let generation = next.input_generation;
                Step::applied(next, vec![Effect::RebuildInput { generation, locale }])
            }
            Event::SetVoiceParams(params) => {
                next.voice = params;
                Step::applied(next, Vec::new())
            }
            Event::ResetVoiceParams => {
                next.voice = VoiceParams::RESET;
                Step::applied(next, Vec::new())
            }
            Event::SetRate(rate) => Self::adjust_voice(next, state.voice.with_rate(rate)),
            Event::SetPitch(pitch) => Self::adjust_voice(next, state.voice.with_pitch(pitch)),
            Event::SetVolume(volume) => Self::adjust_voice(next, state.voice.with_volume(volume)),
            Event::Input { generation, event } => {
                if generation != state.input_generation {
                    return Step::rejected(next, Rejection::Stale);
                }
                Self::input(next, event)
            }
            Event::DispatchResolved { attempt, result } => {
                if next.phase != Phase::Processing || attempt != state.attempt {
                    return Step::rejected(next, Rejection::Stale);
                }
                self.resolve(next, result)
            }
            Event::SpeakDue { attempt } => {
                if next.phase != Phase::Processing || attempt != state.attempt {
                    return Step::rejected(next, Rejection::Stale);
                }
                match next.pending_speech.take() {
                    Some(text) => Self::speak(next, text),
                    None => Step::rejected(next, Rejection::Stale),
                }
            }
            Event::ListenTimedOut { attempt } => {
                if next.phase != Phase::Listening || attempt != state.attempt {
                    return Step::rejected(next, Rejection::Stale);
                }
                next.phase = Phase::Idle;
                next.error = Some(SessionError::Recognition(RecognitionError::TimedOut));
                next.input_generation += 1;
                let effect = Effect::RebuildInput {
                    generation: next.input_generation,
                    locale: next.language.clone(),
                };
                Step::applied(next, vec![effect])
            }
            Event::Output { utterance, event } => {
                if next.phase != Phase::Speaking || utterance != state.utterance {
                    return Step::rejected(next, Rejection::Stale);
                }
                match event {
                    OutputEvent::Started => Step::rejected(next, Rejection::Informational),
                    OutputEvent::Ended => {
                        next.phase = Phase::Idle;
                        Step::applied(next, Vec::new())
                    }
                    OutputEvent::Error(e) => {
                        next.phase = Phase::Idle;
                        next.error = Some(SessionError::Synthesis(e));
                        Step::applied(next, Vec::new())
                    }
                }
            }
        }
    }

    fn start_listening(&self, mut next: SessionState) -> Step {
        let mut effects = Vec::new();

        match next.phase {
            Phase::Listening | Phase::Processing => {
                let phase = next.phase;
                return Step::rejected(next, Rejection::Busy(phase));
            }
            Phase::Speaking => {
                effects.push(Effect::CancelSpeech);
                next.phase = Phase::Idle;
            }
            Phase::Idle => {}
        }

        next.clear_outputs();
        next.transcript.clear();
        next.attempt += 1;
        next.phase = Phase::Listening;

        effects.push(Effect::StartCapture {
            locale: next.language.clone(),
        });
        effects.push(Effect::ArmListenTimeout {
            attempt: next.attempt,
            timeout: self.recognition_timeout,
        });

        Step::applied(next, effects)
    }

    fn submit(mut next: SessionState, text: &str) -> Step {
        if next.phase != Phase::Idle {
            let phase = next.phase;
            return Step::rejected(next, Rejection::Busy(phase));
        }

        let command = text.trim();
        if command.is_empty() {
            next.error = Some(SessionError::Validation(ValidationError::EmptyCommand));
            return Step::rejected(next, Rejection::EmptyCommand);
        }

        next.clear_outputs();
        next.transcript = command.to_string();
        next.input_method = InputMethod::Text;
        next.attempt += 1;
        next.phase = Phase::Processing;

        let effect = Effect::Dispatch {
            attempt: next.attempt,
            command: next.transcript.clone(),
        };
        Step::applied(next, vec![effect])
    }

    fn replay(mut next: SessionState) -> Step {
        if next.phase != Phase::Idle {
            let phase = next.phase;
            return Step::rejected(next, Rejection::Busy(phase));
        }

        match next.response.clone() {
            Some(text) => {
                next.error = None;
                Self::speak(next, text)
            }
            None => Step::rejected(next, Rejection::NothingToReplay),
        }
    }

    fn adjust_voice(
        mut next: SessionState,
        params: Result<VoiceParams, ValidationError>,
    ) -> Step {
        match params {
            Ok(params) => {
                next.voice = params;
                if matches!(
                    next.error,
                    Some(SessionError::Validation(ValidationError::InvalidParameter { .. }))
                ) {
                    next.error = None;
                }
                Step::applied(next, Vec::new())
            }
            Err(e) => {
                next.error = Some(SessionError::Validation(e));
                Step::rejected(next, Rejection::InvalidParameter)
            }
        }
    }

    fn input(mut next: SessionState, event: InputEvent) -> Step {
        if next.phase != Phase::Listening {
            return Step::rejected(next, Rejection::Stale);
        }

        match event {
            InputEvent::Started | InputEvent::Interim(_) => {
                Step::rejected(next, Rejection::Informational)
            }
            InputEvent::FinalResult(text) => {
                let command = text.trim();
                if command.is_empty() {
                    return Step::rejected(next, Rejection::EmptyTranscript);
                }

                next.transcript = command.to_string();
                next.input_method = InputMethod::Voice;
                next.phase = Phase::Processing;

                let effect = Effect::Dispatch {
                    attempt: next.attempt,
                    command: next.transcript.clone(),
                };
                Step::applied(next, vec![effect])
            }
            InputEvent::Error(code) => {
                next.phase = Phase::Idle;
                next.error = Some(SessionError::Recognition(code));
                Step::applied(next, Vec::new())
            }
            InputEvent::Stopped => {
                next.phase = Phase::Idle;
                Step::applied(next, Vec::new())
            }
        }
    }

    fn resolve(&self, mut next: SessionState, result: Result<Reply, DispatchError>) -> Step {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                next.phase = Phase::Idle;
                next.clear_outputs();
                next.error = Some(SessionError::Dispatch(e));
                return Step::applied(next, Vec::new());
            }
        };

        next.pending_speech = Some(reply.speech(&self.phrases).to_string());
        match reply {
            Reply::Spoken(text) => {
                next.response = Some(text);
                next.structured = StructuredResult::None;
            }
            Reply::Chart(rows) => {
                next.response = None;
                next.structured = StructuredResult::Chart(rows);
            }
            Reply::Table(rows) => {
                next.response = None;
                next.structured = StructuredResult::Table(rows);
            }
            Reply::Both(rows) => {
                next.response = None;
                next.structured = StructuredResult::Both(rows);
            }
        }

        let effect = Effect::ScheduleSpeak {
            attempt: next.attempt,
            delay: self.speak_delay,
        };
        Step::applied(next, vec![effect])
    }

    fn speak(mut next: SessionState, text: String) -> Step {
        next.utterance += 1;
        next.phase = Phase::Speaking;

        let effect = Effect::Speak {
            utterance: next.utterance,
            request: SpeechRequest {
                text,
                params: next.voice,
                locale: next.language.clone(),
            },
        };
        Step::applied(next, vec![effect])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Record;
    use crate::error::SynthesisError;

    fn machine() -> Machine {
        let phrases = Phrases {
            completed: "done".to_string(),
            received: "received".to_string(),
            chart: "chart ready".to_string(),
            table: "table ready".to_string(),
            both: "both ready".to_string(),
        };
        Machine::new(phrases, Duration::from_millis(500), Duration::from_secs(15))
    }

    /// Apply events in order, returning the final step
    fn run(machine: &Machine, state: &SessionState, events: Vec<Event>) -> Step {
        let mut step = Step::applied(state.clone(), Vec::new());
        for event in events {
            step = machine.step(&step.state, event);
        }
        step
    }

    fn final_result(state: &SessionState, text: &str) -> Event {
        Event::Input {
            generation: state.input_generation,
            event: InputEvent::FinalResult(text.to_string()),
        }
    }

    fn processing(machine: &Machine) -> SessionState {
        machine
            .step(&SessionState::default(), Event::Submit("sales report".to_string()))
            .state
    }

    fn speaking(machine: &Machine, reply: &str) -> SessionState {
        let state = processing(machine);
        let attempt = state.attempt;
        run(
            machine,
            &state,
            vec![
                Event::DispatchResolved {
                    attempt,
                    result: Ok(Reply::Spoken(reply.to_string())),
                },
                Event::SpeakDue { attempt },
            ],
        )
        .state
    }

    #[test]
    fn test_start_listening_from_idle() {
        let m = machine();
        let mut state = SessionState::default();
        state.response = Some("old".to_string());
        state.transcript = "old".to_string();
        state.error = Some(SessionError::Dispatch(DispatchError::TimedOut));

        let step = m.step(&state, Event::StartListening);

        assert_eq!(step.state.phase, Phase::Listening);
        assert!(step.state.response.is_none());
        assert!(step.state.error.is_none());
        assert!(step.state.transcript.is_empty());
        assert_eq!(
            step.effects[0],
            Effect::StartCapture {
                locale: state.language.clone()
            }
        );
        assert!(matches!(step.effects[1], Effect::ArmListenTimeout { .. }));
    }

    #[test]
    fn test_start_listening_while_speaking_cancels_first() {
        let m = machine();
        let state = speaking(&m, "hello");

        let step = m.step(&state, Event::StartListening);

        assert_eq!(step.state.phase, Phase::Listening);
        assert_eq!(step.effects[0], Effect::CancelSpeech);
        assert!(matches!(step.effects[1], Effect::StartCapture { .. }));
    }

    #[test]
    fn test_start_listening_is_noop_when_busy() {
        let m = machine();

        let listening = m.step(&SessionState::default(), Event::StartListening).state;
        let again = m.step(&listening, Event::StartListening);
        assert_eq!(again.rejection, Some(Rejection::Busy(Phase::Listening)));
        assert!(again.effects.is_empty());
        assert_eq!(again.state, listening);

        let busy = processing(&m);
        let step = m.step(&busy, Event::StartListening);
        assert_eq!(step.rejection, Some(Rejection::Busy(Phase::Processing)));
        assert_eq!(step.state.phase, Phase::Processing);
    }

    #[test]
    fn test_final_transcript_dispatches() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;

        let step = m.step(&listening, final_result(&listening, "  show sales  "));

        assert_eq!(step.state.phase, Phase::Processing);
        assert_eq!(step.state.transcript, "show sales");
        assert_eq!(step.state.input_method, InputMethod::Voice);
        assert_eq!(
            step.effects,
            vec![Effect::Dispatch {
                attempt: listening.attempt,
                command: "show sales".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_final_transcript_is_dropped() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;

        let step = m.step(&listening, final_result(&listening, "   "));
        assert_eq!(step.rejection, Some(Rejection::EmptyTranscript));
        assert!(step.effects.is_empty());
        assert_eq!(step.state.phase, Phase::Listening);

        let stopped = m.step(
            &step.state,
            Event::Input {
                generation: listening.input_generation,
                event: InputEvent::Stopped,
            },
        );
        assert_eq!(stopped.state.phase, Phase::Idle);
    }

    #[test]
    fn test_recognition_error_returns_to_idle() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;

        let step = m.step(
            &listening,
            Event::Input {
                generation: listening.input_generation,
                event: InputEvent::Error(RecognitionError::NoSpeech),
            },
        );

        assert_eq!(step.state.phase, Phase::Idle);
        assert_eq!(
            step.state.error,
            Some(SessionError::Recognition(RecognitionError::NoSpeech))
        );
    }

    #[test]
    fn test_stop_listening_requests_stop() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;

        let step = m.step(&listening, Event::StopListening);
        assert_eq!(step.effects, vec![Effect::StopCapture]);
        assert_eq!(step.state.phase, Phase::Listening);

        let idle = m.step(&SessionState::default(), Event::StopListening);
        assert!(idle.rejection.is_some());
    }

    #[test]
    fn test_empty_submission_never_dispatches() {
        let m = machine();

        for text in ["", "   ", "\n\t"] {
            let step = m.step(&SessionState::default(), Event::Submit(text.to_string()));
            assert!(step.effects.is_empty());
            assert_eq!(step.state.phase, Phase::Idle);
            assert_eq!(step.rejection, Some(Rejection::EmptyCommand));
            assert_eq!(
                step.state.error,
                Some(SessionError::Validation(ValidationError::EmptyCommand))
            );
        }
    }

    #[test]
    fn test_submit_only_from_idle() {
        let m = machine();
        let busy = processing(&m);

        let step = m.step(&busy, Event::Submit("again".to_string()));
        assert_eq!(step.rejection, Some(Rejection::Busy(Phase::Processing)));
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_submit_sets_text_input() {
        let m = machine();
        let mut state = SessionState::default();
        state.structured = StructuredResult::Table(vec![Record::default()]);

        let step = m.step(&state, Event::Submit(" report ".to_string()));

        assert_eq!(step.state.phase, Phase::Processing);
        assert_eq!(step.state.input_method, InputMethod::Text);
        assert_eq!(step.state.transcript, "report");
        assert!(step.state.structured.is_none());
        assert!(matches!(step.effects[..], [Effect::Dispatch { .. }]));
    }

    #[test]
    fn test_text_reply_speaks_after_delay() {
        let m = machine();
        let state = processing(&m);
        let attempt = state.attempt;

        let resolved = m.step(
            &state,
            Event::DispatchResolved {
                attempt,
                result: Ok(Reply::Spoken("ok".to_string())),
            },
        );
        assert_eq!(resolved.state.phase, Phase::Processing);
        assert_eq!(resolved.state.response.as_deref(), Some("ok"));
        assert_eq!(
            resolved.effects,
            vec![Effect::ScheduleSpeak {
                attempt,
                delay: Duration::from_millis(500)
            }]
        );

        let due = m.step(&resolved.state, Event::SpeakDue { attempt });
        assert_eq!(due.state.phase, Phase::Speaking);
        match &due.effects[..] {
            [Effect::Speak { request, .. }] => assert_eq!(request.text, "ok"),
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_both_reply_populates_chart_and_table() {
        let m = machine();
        let mut state = processing(&m);
        state.response = Some("stale".to_string());
        let attempt = state.attempt;
        let rows = vec![Record::default(), Record::default()];

        let step = run(
            &m,
            &state,
            vec![
                Event::DispatchResolved {
                    attempt,
                    result: Ok(Reply::Both(rows)),
                },
                Event::SpeakDue { attempt },
            ],
        );

        assert!(step.state.response.is_none());
        assert_eq!(step.state.structured.chart().map(<[Record]>::len), Some(2));
        assert_eq!(step.state.structured.table().map(<[Record]>::len), Some(2));
        match &step.effects[..] {
            [Effect::Speak { request, .. }] => assert_eq!(request.text, "both ready"),
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_error_returns_to_idle_without_speech() {
        let m = machine();
        let state = processing(&m);

        let step = m.step(
            &state,
            Event::DispatchResolved {
                attempt: state.attempt,
                result: Err(DispatchError::Status(500)),
            },
        );

        assert_eq!(step.state.phase, Phase::Idle);
        assert!(step.state.response.is_none());
        assert!(step.state.structured.is_none());
        assert_eq!(
            step.state.error,
            Some(SessionError::Dispatch(DispatchError::Status(500)))
        );
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_stale_dispatch_result_ignored() {
        let m = machine();
        let state = processing(&m);

        let step = m.step(
            &state,
            Event::DispatchResolved {
                attempt: state.attempt - 1,
                result: Ok(Reply::Spoken("late".to_string())),
            },
        );
        assert_eq!(step.rejection, Some(Rejection::Stale));
        assert_eq!(step.state, state);
    }

    #[test]
    fn test_speech_end_and_error_return_to_idle() {
        let m = machine();
        let state = speaking(&m, "hi");

        let ended = m.step(
            &state,
            Event::Output {
                utterance: state.utterance,
                event: OutputEvent::Ended,
            },
        );
        assert_eq!(ended.state.phase, Phase::Idle);

        let failed = m.step(
            &state,
            Event::Output {
                utterance: state.utterance,
                event: OutputEvent::Error(SynthesisError::Playback("boom".to_string())),
            },
        );
        assert_eq!(failed.state.phase, Phase::Idle);
        assert!(matches!(failed.state.error, Some(SessionError::Synthesis(_))));
    }

    #[test]
    fn test_canceled_utterance_end_does_not_end_new_capture() {
        let m = machine();
        let state = speaking(&m, "hi");
        let old_utterance = state.utterance;

        let listening = m.step(&state, Event::StartListening).state;
        let late_end = m.step(
            &listening,
            Event::Output {
                utterance: old_utterance,
                event: OutputEvent::Ended,
            },
        );

        assert_eq!(late_end.rejection, Some(Rejection::Stale));
        assert_eq!(late_end.state.phase, Phase::Listening);
    }

    #[test]
    fn test_stop_speaking() {
        let m = machine();
        let state = speaking(&m, "hi");

        let step = m.step(&state, Event::StopSpeaking);
        assert_eq!(step.state.phase, Phase::Idle);
        assert_eq!(step.effects, vec![Effect::CancelSpeech]);
    }

    #[test]
    fn test_replay_rules() {
        let m = machine();

        let nothing = m.step(&SessionState::default(), Event::Replay);
        assert_eq!(nothing.rejection, Some(Rejection::NothingToReplay));

        let state = speaking(&m, "again");
        let while_speaking = m.step(&state, Event::Replay);
        assert_eq!(while_speaking.rejection, Some(Rejection::Busy(Phase::Speaking)));
        assert!(while_speaking.effects.is_empty());

        let idle = m
            .step(
                &state,
                Event::Output {
                    utterance: state.utterance,
                    event: OutputEvent::Ended,
                },
            )
            .state;
        let mut failed = idle.clone();
        failed.error = Some(SessionError::Synthesis(SynthesisError::Playback(
            "device lost".to_string(),
        )));
        let replay = m.step(&failed, Event::Replay);
        assert!(replay.state.error.is_none());
        assert_eq!(replay.state.phase, Phase::Speaking);
        assert!(replay.state.utterance > state.utterance);
        match &replay.effects[..] {
            [Effect::Speak { request, .. }] => assert_eq!(request.text, "again"),
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_language_change_interrupts_capture() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;
        let en: Locale = "en-US".parse().unwrap();

        let step = m.step(&listening, Event::ChangeLanguage(en.clone()));

        assert_eq!(step.state.phase, Phase::Idle);
        assert_eq!(step.state.language, en);
        assert_eq!(
            step.state.error,
            Some(SessionError::Recognition(RecognitionError::Interrupted))
        );
        assert_eq!(
            step.effects,
            vec![Effect::RebuildInput {
                generation: listening.input_generation + 1,
                locale: en
            }]
        );

        // The old recognizer's result is ignored
        let late = m.step(&step.state, final_result(&listening, "hello"));
        assert_eq!(late.rejection, Some(Rejection::Stale));
    }

    #[test]
    fn test_language_change_keeps_phase_when_not_listening() {
        let m = machine();
        let state = processing(&m);

        let step = m.step(&state, Event::ChangeLanguage("ja-JP".parse().unwrap()));
        assert_eq!(step.state.phase, Phase::Processing);
        assert!(step.state.error.is_none());
    }

    #[test]
    fn test_listen_timeout() {
        let m = machine();
        let listening = m.step(&SessionState::default(), Event::StartListening).state;

        let step = m.step(
            &listening,
            Event::ListenTimedOut {
                attempt: listening.attempt,
            },
        );
        assert_eq!(step.state.phase, Phase::Idle);
        assert_eq!(
            step.state.error,
            Some(SessionError::Recognition(RecognitionError::TimedOut))
        );
        assert!(matches!(step.effects[..], [Effect::RebuildInput { .. }]));

        // A timer from an earlier attempt does nothing
        let old = m.step(&listening, Event::ListenTimedOut { attempt: 0 });
        assert_eq!(old.rejection, Some(Rejection::Stale));
    }

    #[test]
    fn test_voice_params_persist_across_commands() {
        let m = machine();
        let params = VoiceParams::new(1.0, 1.5, 0.4).unwrap();

        let state = m.step(&SessionState::default(), Event::SetVoiceParams(params)).state;
        let state = m.step(&state, Event::Submit("hi".to_string())).state;
        let attempt = state.attempt;
        let step = run(
            &m,
            &state,
            vec![
                Event::DispatchResolved {
                    attempt,
                    result: Ok(Reply::Spoken("yo".to_string())),
                },
                Event::SpeakDue { attempt },
            ],
        );

        match &step.effects[..] {
            [Effect::Speak { request, .. }] => assert_eq!(request.params, params),
            other => panic!("unexpected effects: {other:?}"),
        }

        let reset = m.step(&step.state, Event::ResetVoiceParams);
        assert_eq!(reset.state.voice, VoiceParams::RESET);
    }

    #[test]
    fn test_single_voice_setting_applies_to_current_params() {
        let m = machine();

        let state = m.step(&SessionState::default(), Event::SetRate(1.0)).state;
        let step = m.step(&state, Event::SetPitch(1.8));
        assert_eq!(step.rejection, None);
        assert!((step.state.voice.rate() - 1.0).abs() < f32::EPSILON);
        assert!((step.state.voice.pitch() - 1.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_out_of_range_voice_setting_is_recorded() {
        let m = machine();
        let initial = SessionState::default();

        let step = m.step(&initial, Event::SetVolume(1.5));
        assert_eq!(step.rejection, Some(Rejection::InvalidParameter));
        assert_eq!(step.state.voice, initial.voice);
        assert!(matches!(
            step.state.error,
            Some(SessionError::Validation(ValidationError::InvalidParameter {
                name: "volume",
                ..
            }))
        ));

        // A valid setting clears the stale message
        let fixed = m.step(&step.state, Event::SetVolume(0.5));
        assert!(fixed.state.error.is_none());
    }

    #[test]
    fn test_never_two_phases_across_random_walk() {
        // Phase is an enum so exclusivity is structural; this walks many event
        // orders to make sure no transition panics or leaks a stale effect.
        let m = machine();
        let events = |s: &SessionState| {
            vec![
                Event::StartListening,
                Event::Submit("cmd".to_string()),
                final_result(s, "spoken"),
                Event::DispatchResolved {
                    attempt: s.attempt,
                    result: Ok(Reply::Table(vec![])),
                },
                Event::SpeakDue { attempt: s.attempt },
                Event::Output {
                    utterance: s.utterance,
                    event: OutputEvent::Ended,
                },
                Event::StopSpeaking,
                Event::Replay,
            ]
        };

        let mut state = SessionState::default();
        for round in 0..64usize {
            let options = events(&state);
            let event = options[(round * 7 + round / 3) % options.len()].clone();
            let step = m.step(&state, event);

            let speaks = step
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::Speak { .. }))
                .count();
            let captures = step
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::StartCapture { .. }))
                .count();
            assert!(speaks + captures <= 1);
            if captures == 1 {
                assert_eq!(step.state.phase, Phase::Listening);
            }
            if speaks == 1 {
                assert_eq!(step.state.phase, Phase::Speaking);
            }

            state = step.state;
        }
    }
}
