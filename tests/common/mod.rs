//! Shared test utilities: recording mock adapters

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voice_command::config::Config;
use voice_command::dispatch::{CommandDispatcher, Reply};
use voice_command::error::{DispatchError, RecognitionError, SynthesisError};
use voice_command::session::{Session, SessionHandle, SessionState};
use voice_command::voice::{
    InputEvent, InputSink, Locale, OutputEvent, OutputSink, SpeechInput, SpeechInputFactory,
    SpeechOutput, SpeechRequest,
};

/// Adapter call observed by a mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Recognizer built for a locale
    CreateInput(String),
    /// Capture started
    StartCapture(String),
    /// Capture stopped
    StopCapture,
    /// Utterance spoken
    Speak(String),
    /// Playback canceled
    CancelSpeech,
    /// Command dispatched
    Dispatch(String),
}

/// Ordered record of adapter calls shared by all mocks
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Dispatch(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Speak(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

/// Recognizer factory keeping every sink it handed out
#[derive(Clone, Default)]
pub struct MockInputFactory {
    log: CallLog,
    sinks: Arc<Mutex<Vec<InputSink>>>,
    fail_start: Option<RecognitionError>,
}

impl MockInputFactory {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    /// Every `start` fails with `error`
    pub fn failing(log: &CallLog, error: RecognitionError) -> Self {
        Self {
            fail_start: Some(error),
            ..Self::new(log)
        }
    }

    /// Emit through the sink of recognizer number `index` (0 = first built)
    pub fn emit_on(&self, index: usize, event: InputEvent) {
        let sink = self.sinks.lock().unwrap()[index].clone();
        sink.emit(event);
    }

    /// Emit through the most recently built recognizer
    pub fn emit(&self, event: InputEvent) {
        let sink = self.sinks.lock().unwrap().last().cloned().unwrap();
        sink.emit(event);
    }

    pub fn built(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

impl SpeechInputFactory for MockInputFactory {
    fn create(&self, locale: &Locale, sink: InputSink) -> Box<dyn SpeechInput> {
        self.log.push(Call::CreateInput(locale.to_string()));
        self.sinks.lock().unwrap().push(sink);
        Box::new(MockInput {
            log: self.log.clone(),
            fail_start: self.fail_start.clone(),
        })
    }
}

struct MockInput {
    log: CallLog,
    fail_start: Option<RecognitionError>,
}

#[async_trait]
impl SpeechInput for MockInput {
    async fn start(&mut self, locale: &Locale) -> Result<(), RecognitionError> {
        self.log.push(Call::StartCapture(locale.to_string()));
        match &self.fail_start {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn stop(&mut self) {
        self.log.push(Call::StopCapture);
    }
}

/// Synthesizer that either finishes at once or waits to be told
#[derive(Clone, Default)]
pub struct MockOutput {
    log: CallLog,
    hold: bool,
    current: Arc<Mutex<Option<OutputSink>>>,
    requests: Arc<Mutex<Vec<SpeechRequest>>>,
}

impl MockOutput {
    /// Utterances end immediately
    pub fn instant(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    /// Utterances keep playing until `finish` or `fail`
    pub fn holding(log: &CallLog) -> Self {
        Self {
            hold: true,
            ..Self::instant(log)
        }
    }

    pub fn finish(&self) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.emit(OutputEvent::Ended);
        }
    }

    pub fn fail(&self, error: SynthesisError) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.emit(OutputEvent::Error(error));
        }
    }

    /// Sink of the utterance still playing
    pub fn sink(&self) -> Option<OutputSink> {
        self.current.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for MockOutput {
    async fn speak(
        &mut self,
        request: SpeechRequest,
        sink: OutputSink,
    ) -> Result<(), SynthesisError> {
        self.log.push(Call::Speak(request.text.clone()));
        self.requests.lock().unwrap().push(request);

        sink.emit(OutputEvent::Started);
        if self.hold {
            *self.current.lock().unwrap() = Some(sink);
        } else {
            sink.emit(OutputEvent::Ended);
        }
        Ok(())
    }

    async fn cancel(&mut self) {
        self.log.push(Call::CancelSpeech);
    }
}

/// Dispatcher answering from a queue, `Spoken("ok")` once empty
#[derive(Clone, Default)]
pub struct MockDispatcher {
    log: CallLog,
    replies: Arc<Mutex<VecDeque<Result<Reply, DispatchError>>>>,
    delay: Duration,
}

impl MockDispatcher {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reply(self, reply: Result<Reply, DispatchError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl CommandDispatcher for MockDispatcher {
    async fn dispatch(&self, command: &str) -> Result<Reply, DispatchError> {
        self.log.push(Call::Dispatch(command.to_string()));
        tokio::time::sleep(self.delay).await;

        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Reply::Spoken("ok".to_string())))
    }
}

/// Configuration with short delays for tests
pub fn test_config() -> Config {
    Config {
        speak_delay: Duration::from_millis(10),
        dispatch_timeout: Duration::from_secs(2),
        recognition_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

/// Spawn a session with the given mocks
pub fn spawn(
    config: &Config,
    input: &MockInputFactory,
    output: &MockOutput,
    dispatcher: &MockDispatcher,
) -> SessionHandle {
    Session::spawn(
        config,
        Arc::new(input.clone()),
        Box::new(output.clone()),
        Arc::new(dispatcher.clone()),
    )
}

/// Wait for a state matching `predicate`, failing the test after 5 seconds
pub async fn wait_until(
    session: &SessionHandle,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), session.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session closed")
}
