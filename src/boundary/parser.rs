//! Stream Parser
//!
//! Recovers one command's output and exit status from the raw shell output
//! stream. Chunks may split markers, line breaks and UTF-8 sequences at any
//! byte; the parser buffers across chunk boundaries and only matches complete
//! tokens of its own detector.

use serde::{Deserialize, Serialize};

use super::BoundaryDetector;
use crate::error::Error;

/// Longest status token accepted before it is declared malformed
const MAX_STATUS_LEN: usize = 16;

/// Parser position within one command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Discarding shell chrome until the open token appears
    AwaitingOpenMarker,
    /// Streaming command output until the close token appears
    CapturingOutput,
    /// Reading the exit status token after the close marker
    ReadingStatus,
    /// Result emitted; further input is ignored
    Completed,
}

/// Why a command reached completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Close marker observed
    Marker,
    /// Shell process exited before the close marker
    ProcessExited,
    /// Cancelled by the caller
    Cancelled,
    /// Close marker not observed within the operator timeout
    TimedOut,
}

/// Final result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Output between the markers
    pub output: String,
    /// Exit status, `None` when unknown
    pub exit_status: Option<i32>,
    /// How the command completed
    pub completion: Completion,
    /// Whether `output` was cut at the configured limit
    pub truncated: bool,
}

impl CommandOutcome {
    /// Whether the command completed normally with status 0
    pub fn succeeded(&self) -> bool {
        self.completion == Completion::Marker && self.exit_status == Some(0)
    }
}

/// Event produced while feeding the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// Newly captured output text
    Partial(String),
    /// The command is complete
    Complete(CommandOutcome),
}

/// Parser tuning
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Rewrite `\r\n` to `\n` in emitted text
    pub normalize_crlf: bool,
    /// Upper bound on bytes kept for the final output
    pub max_output_bytes: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            normalize_crlf: true,
            max_output_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Incremental state machine for one pending command
#[derive(Debug)]
pub struct StreamParser {
    open: Vec<u8>,
    close: Vec<u8>,
    options: ParserOptions,
    state: ParserState,
    /// Bytes received but not yet classified
    pending: Vec<u8>,
    /// Captured output kept for the final result
    output: Vec<u8>,
    /// Captured bytes not yet emitted as partial text
    carry: Vec<u8>,
    status: Vec<u8>,
    status_started: bool,
    skip_open_newline: bool,
    truncated: bool,
    anomaly: Option<Error>,
}

impl StreamParser {
    /// Create a parser bound to `detector`
    pub fn new(detector: &BoundaryDetector, options: ParserOptions) -> Self {
        Self {
            open: detector.open_token().as_bytes().to_vec(),
            close: detector.close_token().as_bytes().to_vec(),
            options,
            state: ParserState::AwaitingOpenMarker,
            pending: Vec::new(),
            output: Vec::new(),
            carry: Vec::new(),
            status: Vec::new(),
            status_started: false,
            skip_open_newline: false,
            truncated: false,
            anomaly: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == ParserState::Completed
    }

    /// Recovered protocol anomaly observed while parsing, if any
    pub fn take_anomaly(&mut self) -> Option<Error> {
        self.anomaly.take()
    }

    /// Feed the next chunk of raw output
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        if self.is_completed() {
            return events;
        }
        self.pending.extend_from_slice(chunk);

        loop {
            match self.state {
                ParserState::AwaitingOpenMarker => {
                    if let Some(pos) = find_subslice(&self.pending, &self.open) {
                        self.pending.drain(..pos + self.open.len());
                        self.state = ParserState::CapturingOutput;
                        self.skip_open_newline = true;
                    } else {
                        let keep = self.open.len().saturating_sub(1);
                        if self.pending.len() > keep {
                            let cut = self.pending.len() - keep;
                            self.pending.drain(..cut);
                        }
                        break;
                    }
                }
                ParserState::CapturingOutput => {
                    if self.skip_open_newline && !self.skip_line_break() {
                        break;
                    }
                    if let Some(pos) = find_subslice(&self.pending, &self.close) {
                        let captured: Vec<u8> = self.pending.drain(..pos).collect();
                        self.pending.drain(..self.close.len());
                        self.push_partial(&captured, &mut events);
                        self.state = ParserState::ReadingStatus;
                    } else {
                        let keep = partial_match_suffix(&self.pending, &self.close);
                        let safe = self.pending.len() - keep;
                        if safe > 0 {
                            let captured: Vec<u8> = self.pending.drain(..safe).collect();
                            self.push_partial(&captured, &mut events);
                        }
                        break;
                    }
                }
                ParserState::ReadingStatus => {
                    if !self.status_started {
                        if self.pending.is_empty() {
                            break;
                        }
                        if self.pending[0] == b' ' {
                            self.pending.remove(0);
                        }
                        self.status_started = true;
                    }
                    if let Some(pos) = self.pending.iter().position(|b| b.is_ascii_whitespace()) {
                        self.status.extend_from_slice(&self.pending[..pos]);
                        self.pending.clear();
                        self.complete(Completion::Marker, None, &mut events);
                    } else {
                        self.status.append(&mut self.pending);
                        if self.status.len() > MAX_STATUS_LEN {
                            self.complete(Completion::Marker, None, &mut events);
                        }
                        break;
                    }
                }
                ParserState::Completed => break,
            }
        }

        events
    }

    /// Force completion when no close marker will arrive.
    ///
    /// `exit_code` is used for [`Completion::ProcessExited`]; cancelled and
    /// timed out commands always report an unknown status. Returns no events
    /// if the parser already completed.
    pub fn finish(&mut self, completion: Completion, exit_code: Option<i32>) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        match self.state {
            ParserState::Completed => return events,
            ParserState::AwaitingOpenMarker => {
                self.pending.clear();
            }
            ParserState::CapturingOutput => {
                let rest = std::mem::take(&mut self.pending);
                self.push_partial(&rest, &mut events);
            }
            ParserState::ReadingStatus => {
                // Close marker already seen; a complete status wins over the fallback
                let rest = std::mem::take(&mut self.pending);
                self.status.extend_from_slice(&rest);
                if parse_status(&self.status).is_some() {
                    self.complete(Completion::Marker, None, &mut events);
                    return events;
                }
            }
        }

        let fallback = match completion {
            Completion::ProcessExited => exit_code,
            _ => None,
        };
        self.status.clear();
        self.complete(completion, Some(fallback), &mut events);
        events
    }

    /// Drop the line break that terminates the open marker line.
    /// Returns false when more input is needed to decide.
    fn skip_line_break(&mut self) -> bool {
        match self.pending.first() {
            None => return false,
            Some(b'\n') => {
                self.pending.remove(0);
            }
            Some(b'\r') => match self.pending.get(1) {
                None => return false,
                Some(b'\n') => {
                    self.pending.drain(..2);
                }
                Some(_) => {}
            },
            Some(_) => {}
        }
        self.skip_open_newline = false;
        true
    }

    fn push_partial(&mut self, bytes: &[u8], events: &mut Vec<ParseEvent>) {
        if bytes.is_empty() {
            return;
        }
        if !self.truncated {
            let room = self.options.max_output_bytes.saturating_sub(self.output.len());
            if bytes.len() > room {
                warn!(
                    "Command output exceeded {} bytes, truncating result",
                    self.options.max_output_bytes
                );
                self.truncated = true;
                self.output.extend_from_slice(&bytes[..room]);
                // Never cut inside a character
                let cut = self.output.len() - incomplete_utf8_suffix(&self.output);
                self.output.truncate(cut);
            } else {
                self.output.extend_from_slice(bytes);
            }
        }

        self.carry.extend_from_slice(bytes);
        let mut emit = self.carry.len() - incomplete_utf8_suffix(&self.carry);
        if self.options.normalize_crlf && emit > 0 && self.carry[emit - 1] == b'\r' {
            emit -= 1;
        }
        if emit > 0 {
            let chunk: Vec<u8> = self.carry.drain(..emit).collect();
            events.push(ParseEvent::Partial(self.to_text(&chunk)));
        }
    }

    /// Emit the final result. `forced_status` of `Some` bypasses status parsing.
    fn complete(
        &mut self,
        completion: Completion,
        forced_status: Option<Option<i32>>,
        events: &mut Vec<ParseEvent>,
    ) {
        if !self.carry.is_empty() {
            let rest = std::mem::take(&mut self.carry);
            events.push(ParseEvent::Partial(self.to_text(&rest)));
        }

        let exit_status = match forced_status {
            Some(status) => status,
            None => {
                let status = parse_status(&self.status);
                if status.is_none() {
                    let token = String::from_utf8_lossy(&self.status).into_owned();
                    warn!("Malformed exit status token '{}', treating as unknown", token);
                    self.anomaly = Some(Error::MalformedExitStatus { token });
                }
                status
            }
        };

        let raw = std::mem::take(&mut self.output);
        let output = self.to_text(&raw);
        self.pending.clear();
        self.state = ParserState::Completed;
        events.push(ParseEvent::Complete(CommandOutcome {
            output,
            exit_status,
            completion,
            truncated: self.truncated,
        }));
    }

    fn to_text(&self, bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        if self.options.normalize_crlf {
            text.replace("\r\n", "\n")
        } else {
            text.into_owned()
        }
    }
}

fn parse_status(token: &[u8]) -> Option<i32> {
    std::str::from_utf8(token).ok()?.trim().parse().ok()
}

/// Position of the first full occurrence of `needle` in `haystack`
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest suffix of `haystack` that is a proper prefix of `needle`
fn partial_match_suffix(haystack: &[u8], needle: &[u8]) -> usize {
    let max = needle.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&k| haystack.ends_with(&needle[..k]))
        .unwrap_or(0)
}

/// Length of a trailing UTF-8 sequence that is not yet complete
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    let n = bytes.len();
    for back in 1..=n.min(3) {
        let b = bytes[n - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = if b & 0xE0 == 0xC0 {
            2
        } else if b & 0xF0 == 0xE0 {
            3
        } else if b & 0xF8 == 0xF0 {
            4
        } else {
            1
        };
        return if needed > back { back } else { 0 };
    }
    0
}
