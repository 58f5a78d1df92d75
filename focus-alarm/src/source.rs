//! Where attention samples come from.
//!
//! The classifier lives outside this crate. It reaches us either as
//! bare numbers (0 focused, 1 distracted) or as its JSON event payload,
//! `{"label": "focused", "probs": {"focused": 0.8, "unfocused": 0.2}}`,
//! possibly still carrying the `data: ` prefix of an event stream. A
//! [`SampleSource`] turns either form into samples for the producer.

use std::collections::HashMap;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

const EVENT_DATA_PREFIX: &str = "data:";

/// Classifier output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionState {
    Focused,
    #[serde(rename = "unfocused")]
    Distracted,
}

impl AttentionState {
    pub fn as_sample(self) -> f64 {
        match self {
            AttentionState::Focused => 0.0,
            AttentionState::Distracted => 1.0,
        }
    }
}

impl From<AttentionState> for f64 {
    fn from(state: AttentionState) -> Self {
        state.as_sample()
    }
}

/// One classifier event as emitted by the inference service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub probs: HashMap<String, f64>,
}

impl Classification {
    /// Decode one event payload, with or without the `data:` prefix.
    ///
    /// Returns `Ok(None)` for empty payloads (stream keep-alives).
    pub fn parse(payload: &str) -> Result<Option<Self>> {
        let payload = payload.trim();
        let json = payload
            .strip_prefix(EVENT_DATA_PREFIX)
            .unwrap_or(payload)
            .trim();

        if json.is_empty() {
            return Ok(None);
        }

        let classification: Option<Self> = serde_json::from_str(json)?;
        classification
            .map(Some)
            .ok_or_else(|| Error::Source(format!("null classification: {json}")))
    }

    /// Map the event to an attention state.
    ///
    /// The label wins when it is `focused` or `unfocused`. Otherwise the
    /// `focused` probability decides (above 0.5 means focused; missing
    /// counts as 0.5). An event with neither label nor probabilities
    /// carries no information and yields `None`.
    pub fn state(&self) -> Option<AttentionState> {
        match self.label.as_str() {
            "focused" => return Some(AttentionState::Focused),
            "unfocused" => return Some(AttentionState::Distracted),
            _ => {}
        }

        if self.label.is_empty() && self.probs.is_empty() {
            return None;
        }

        if self.probs.is_empty() {
            warn!(label = %self.label, "Unknown label and no probabilities, assuming focused");
            return Some(AttentionState::Focused);
        }

        let focused = self.probs.get("focused").copied().unwrap_or(0.5);
        Some(if focused > 0.5 {
            AttentionState::Focused
        } else {
            AttentionState::Distracted
        })
    }
}

/// Parse one line of input into a sample.
///
/// Accepts bare numbers (passed through unchanged), the words `focused`
/// and `unfocused`, and classifier JSON events. Blank lines and
/// uninformative events yield `Ok(None)`.
pub fn parse_sample_line(line: &str) -> Result<Option<f64>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Ok(value) = line.parse::<f64>() {
        if !value.is_finite() {
            return Err(Error::Source(format!("non-finite sample: {line}")));
        }
        return Ok(Some(value));
    }

    match line {
        "focused" => return Ok(Some(AttentionState::Focused.as_sample())),
        "unfocused" => return Ok(Some(AttentionState::Distracted.as_sample())),
        _ => {}
    }

    if line.starts_with(EVENT_DATA_PREFIX) || line.starts_with('{') || line == "null" {
        let state = Classification::parse(line)?.and_then(|c| c.state());
        return Ok(state.map(AttentionState::as_sample));
    }

    Err(Error::Source(format!("unrecognized sample: {line}")))
}

/// Blocking supplier of attention samples, pulled by the producer
/// thread.
pub trait SampleSource: Send {
    /// Block until the next sample is available.
    ///
    /// `Ok(None)` means the source is exhausted. [`Error::Source`] and
    /// [`Error::Json`] mark a single bad reading and the caller may keep
    /// pulling; any other error ends the stream.
    fn next_sample(&mut self) -> Result<Option<f64>>;
}

/// Replays a fixed sequence with a pause between samples.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<f64>,
    position: usize,
    interval: Duration,
}

/// Recorded session used for demos: settled focus, a long distraction,
/// rapid flicker, then alternating stretches. Each entry is
/// `(state, run_length)`.
const DEMO_RUNS: &[(u8, usize)] = &[
    (0, 20),
    (1, 40),
    (0, 15),
    (1, 30),
    (0, 2),
    (1, 2),
    (0, 2),
    (1, 2),
    (0, 2),
    (1, 2),
    (0, 2),
    (1, 2),
    (0, 2),
    (1, 2),
    (0, 2),
    (1, 2),
    (0, 31),
    (1, 50),
    (0, 40),
    (1, 10),
    (0, 20),
];

impl ReplaySource {
    pub fn new(samples: Vec<f64>, interval: Duration) -> Self {
        Self {
            samples,
            position: 0,
            interval,
        }
    }

    /// The built-in demo session.
    pub fn demo(interval: Duration) -> Self {
        let samples = DEMO_RUNS
            .iter()
            .flat_map(|&(state, len)| std::iter::repeat_n(f64::from(state), len))
            .collect();
        Self::new(samples, interval)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn next_sample(&mut self) -> Result<Option<f64>> {
        let Some(&sample) = self.samples.get(self.position) else {
            return Ok(None);
        };

        if self.position > 0 && !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        self.position += 1;

        Ok(Some(sample))
    }
}

/// Reads one sample per line from any buffered reader (stdin, a pipe
/// from the inference service, a capture file).
pub struct LineSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> SampleSource for LineSource<R> {
    fn next_sample(&mut self) -> Result<Option<f64>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }

            if let Some(sample) = parse_sample_line(&self.line)? {
                return Ok(Some(sample));
            }
            trace!(line = %self.line.trim(), "Skipping line without a sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use test_case::test_case;

    use super::*;

    #[test_case("0", Some(0.0); "bare focused")]
    #[test_case("1", Some(1.0); "bare distracted")]
    #[test_case(" 0.75 \n", Some(0.75); "probability passes through")]
    #[test_case("focused", Some(0.0); "word focused")]
    #[test_case("unfocused", Some(1.0); "word unfocused")]
    #[test_case("", None; "blank")]
    #[test_case("data: ", None; "keep alive")]
    #[test_case(r#"data: {"label": "unfocused", "probs": {"focused": 0.9}}"#, Some(1.0); "label wins")]
    #[test_case(r#"{"label": "?", "probs": {"focused": 0.7}}"#, Some(0.0); "probs focused")]
    #[test_case(r#"{"label": "?", "probs": {"focused": 0.5}}"#, Some(1.0); "even odds distracted")]
    #[test_case(r#"{"label": "?", "probs": {"unfocused": 0.9}}"#, Some(1.0); "missing focused prob")]
    #[test_case(r#"{"label": "drowsy"}"#, Some(0.0); "unknown label defaults focused")]
    #[test_case(r#"{}"#, None; "no information")]
    fn should_parse_sample_lines(line: &str, expected: Option<f64>) {
        assert_eq!(parse_sample_line(line).unwrap(), expected);
    }

    #[test_case("banana"; "garbage word")]
    #[test_case("{not json"; "broken json")]
    #[test_case("null"; "null event")]
    #[test_case("data: [1, 2]"; "wrong shape")]
    #[test_case("NaN"; "not a number")]
    fn should_reject_malformed_lines(line: &str) {
        assert!(parse_sample_line(line).is_err());
    }

    #[test]
    fn should_replay_demo_session() {
        let mut source = ReplaySource::demo(Duration::ZERO);
        assert_eq!(source.len(), 280);

        let mut samples = Vec::new();
        while let Some(sample) = source.next_sample().unwrap() {
            samples.push(sample);
        }

        assert_eq!(samples.len(), 280);
        assert!(samples[..20].iter().all(|&s| s == 0.0));
        assert!(samples[20..60].iter().all(|&s| s == 1.0));
        assert_eq!(source.next_sample().unwrap(), None);
    }

    #[test]
    fn should_skip_blank_lines_and_stop_at_eof() {
        let input = Cursor::new("0\n\n1\ndata: \n{\"label\": \"focused\"}\n");
        let mut source = LineSource::new(input);

        assert_eq!(source.next_sample().unwrap(), Some(0.0));
        assert_eq!(source.next_sample().unwrap(), Some(1.0));
        assert_eq!(source.next_sample().unwrap(), Some(0.0));
        assert_eq!(source.next_sample().unwrap(), None);
    }

    #[test]
    fn should_surface_bad_line_and_continue() {
        let input = Cursor::new("1\noops\n0\n");
        let mut source = LineSource::new(input);

        assert_eq!(source.next_sample().unwrap(), Some(1.0));
        assert!(matches!(source.next_sample(), Err(Error::Source(_))));
        assert_eq!(source.next_sample().unwrap(), Some(0.0));
    }
}
