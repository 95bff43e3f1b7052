use std::sync::Mutex;

use codemod_runner::engine::{
    CodemodExecutionError, ConsoleKind, EventSink, PrinterMessage, RunResult,
};

/// Event sink that keeps everything it is told.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    messages: Mutex<Vec<PrinterMessage>>,
    errors: Mutex<Vec<CodemodExecutionError>>,
    successes: Mutex<Vec<RunResult>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PrinterMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CodemodExecutionError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn successes(&self) -> Vec<RunResult> {
        self.successes.lock().unwrap().clone()
    }

    /// Text of every `Console { Warn }` message.
    pub fn warnings(&self) -> Vec<String> {
        self.console(ConsoleKind::Warn)
    }

    pub fn infos(&self) -> Vec<String> {
        self.console(ConsoleKind::Info)
    }

    /// `(codemod, processed, total)` for every progress message.
    pub fn progress(&self) -> Vec<(String, usize, usize)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                PrinterMessage::Progress {
                    codemod_name,
                    processed_file_number,
                    total_file_number,
                    ..
                } => Some((codemod_name, processed_file_number, total_file_number)),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.messages().contains(&PrinterMessage::Finish)
    }

    fn console(&self, wanted: ConsoleKind) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                PrinterMessage::Console { kind, message } if kind == wanted => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn on_message(&self, message: PrinterMessage) {
        self.messages.lock().unwrap().push(message);
    }

    fn on_codemod_error(&self, error: CodemodExecutionError) {
        self.errors.lock().unwrap().push(error);
    }

    fn on_success(&self, result: RunResult) {
        self.successes.lock().unwrap().push(result);
    }
}
