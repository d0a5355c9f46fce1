//! Property-based tests for the stream parser
//!
//! However the shell's output is chunked by the transport, the parser must
//! produce the same outcome, and the partial text it streams must add up to
//! exactly the final output.

use mosaicterm_session::boundary::{ParseEvent, ParserOptions};
use mosaicterm_session::{BoundaryDetector, CommandOutcome, Completion, StreamParser};
use proptest::prelude::*;

const OPEN: &str = "0123456789abcdef0123456789abcdef";
const CLOSE: &str = "fedcba9876543210fedcba9876543210";

fn parser() -> StreamParser {
    StreamParser::new(
        &BoundaryDetector::with_tokens(OPEN, CLOSE),
        ParserOptions::default(),
    )
}

/// Feed `bytes` split at `cuts`, returning streamed text and the outcome
fn feed_split(bytes: &[u8], cuts: &[usize]) -> (String, Option<CommandOutcome>) {
    let mut parser = parser();
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.push(0);
    points.push(bytes.len());
    points.sort_unstable();
    points.dedup();

    let mut text = String::new();
    let mut outcome = None;
    for window in points.windows(2) {
        for event in parser.feed(&bytes[window[0]..window[1]]) {
            match event {
                ParseEvent::Partial(t) => text.push_str(&t),
                ParseEvent::Complete(o) => {
                    assert!(outcome.is_none(), "completed twice");
                    outcome = Some(o);
                }
            }
        }
    }
    (text, outcome)
}

fn stream(prefix: &str, output: &str, status: i32, newline: &str) -> Vec<u8> {
    format!(
        "{}{}{}{}{} {}{}",
        prefix, OPEN, newline, output, CLOSE, status, newline
    )
    .into_bytes()
}

proptest! {
    #[test]
    fn test_chunking_does_not_change_outcome(
        prefix in "[g-z $>#\r\n]{0,40}",
        output in "(\\PC|\n|\r\n){0,120}",
        status in 0i32..256,
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let bytes = stream(&prefix, &output, status, "\n");
        let (whole_text, whole) = feed_split(&bytes, &[]);
        let (split_text, split) = feed_split(&bytes, &cuts);

        let expected = output.replace("\r\n", "\n");
        let whole = whole.expect("complete");
        prop_assert_eq!(&whole.output, &expected);
        prop_assert_eq!(whole.exit_status, Some(status));
        prop_assert_eq!(whole.completion, Completion::Marker);
        prop_assert_eq!(Some(whole), split);
        prop_assert_eq!(&whole_text, &expected);
        prop_assert_eq!(&split_text, &expected);
    }

    #[test]
    fn test_pty_line_endings_are_normalized(
        lines in prop::collection::vec("[a-zA-Z0-9 ]{0,30}", 0..8),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let output: String = lines.iter().map(|l| format!("{}\r\n", l)).collect();
        let bytes = stream("$ ", &output, 0, "\r\n");
        let (text, outcome) = feed_split(&bytes, &cuts);

        let expected: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        let outcome = outcome.expect("complete");
        prop_assert_eq!(&outcome.output, &expected);
        prop_assert_eq!(text, expected);
        prop_assert_eq!(outcome.exit_status, Some(0));
    }

    #[test]
    fn test_stream_without_markers_never_completes(
        noise in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut parser = parser();
        let events = parser.feed(&noise);
        prop_assert!(events.is_empty());
        prop_assert!(!parser.is_completed());

        let forced = parser.finish(Completion::ProcessExited, Some(9));
        match forced.last() {
            Some(ParseEvent::Complete(outcome)) => {
                prop_assert_eq!(outcome.output.as_str(), "");
                prop_assert_eq!(outcome.exit_status, Some(9));
            }
            other => prop_assert!(false, "unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_forced_completion_keeps_captured_output(
        output in "[a-z\n]{0,100}",
        completion in prop_oneof![
            Just(Completion::Cancelled),
            Just(Completion::TimedOut),
        ],
    ) {
        let mut parser = parser();
        let bytes = format!("{}\n{}", OPEN, output).into_bytes();
        let mut text: String = parser
            .feed(&bytes)
            .into_iter()
            .filter_map(|e| match e {
                ParseEvent::Partial(t) => Some(t),
                ParseEvent::Complete(_) => None,
            })
            .collect();

        let mut outcome = None;
        for event in parser.finish(completion, Some(1)) {
            match event {
                ParseEvent::Partial(t) => text.push_str(&t),
                ParseEvent::Complete(o) => outcome = Some(o),
            }
        }
        let outcome = outcome.expect("complete");
        prop_assert_eq!(&outcome.output, &output);
        prop_assert_eq!(text, output);
        prop_assert_eq!(outcome.exit_status, None);
        prop_assert_eq!(outcome.completion, completion);
    }
}
