//! The recognizer's machine-readable protocol.
//!
//! Three kinds of text come back from the executable:
//! - `--version` output containing `version X.Y.Z`
//! - stderr status lines, one JSON object per line, streamed while it runs
//! - the stdout cue document, a single JSON object written at exit
//!
//! Status lines are best-effort telemetry: anything malformed is logged and
//! skipped. The cue document is the result, so anything malformed there is a
//! protocol error.

use std::path::Path;

use lipsync_common::error::{LipsyncError, LipsyncResult};
use serde::{Deserialize, Deserializer, Serialize};

use crate::cue::{MouthCue, MouthShape};

/// Extract the `X.Y.Z` after the first `version` that is followed by
/// whitespace and three dot-separated numbers. The match is case-sensitive
/// and may sit inside a longer word (`subversion 1.2.3` matches). Empty when
/// absent.
pub fn parse_version(stdout: &str) -> String {
    for (idx, word) in stdout.match_indices("version") {
        let after = &stdout[idx + word.len()..];
        let rest = after.trim_start();
        if rest.len() == after.len() {
            continue;
        }
        if let Some(version) = leading_semver(rest) {
            return version;
        }
    }
    String::new()
}

/// Leading `\d+\.\d+\.\d+` of `text`.
fn leading_semver(text: &str) -> Option<String> {
    let mut parts = Vec::with_capacity(3);
    let mut rest = text;
    for idx in 0..3 {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        parts.push(&rest[..digits]);
        rest = &rest[digits..];
        if idx < 2 {
            rest = rest.strip_prefix('.')?;
        }
    }
    Some(parts.join("."))
}

/// Severity attached to a relayed tool log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ToolLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    #[serde(other)]
    Unknown,
}

/// A log message embedded in a status line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolLog {
    pub level: ToolLogLevel,
    #[serde(default)]
    pub message: String,
}

/// What a status line reports.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusKind {
    Start,
    /// Fraction complete in `[0.0, 1.0]`.
    Progress(f64),
    Failure(String),
    /// Unrecognized or missing `type`; only its log (if any) matters.
    Other,
}

/// One parsed stderr status line.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub log: Option<ToolLog>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<f64>,
    reason: Option<String>,
    log: Option<ToolLog>,
}

/// Parse one status line. `None` for blank or malformed lines.
pub fn parse_status_line(line: &str) -> Option<StatusEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: RawStatus = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(line, error = %e, "Skipping malformed status line");
            return None;
        }
    };

    let kind = match raw.kind.as_deref() {
        Some("start") => StatusKind::Start,
        Some("progress") => match raw.value {
            Some(value) => StatusKind::Progress(value.clamp(0.0, 1.0)),
            None => {
                tracing::warn!(line, "Progress status line without value");
                StatusKind::Other
            }
        },
        Some("failure") => StatusKind::Failure(
            raw.reason
                .unwrap_or_else(|| "recognizer reported failure without a reason".to_string()),
        ),
        _ => StatusKind::Other,
    };

    Some(StatusEvent { kind, log: raw.log })
}

/// Header of a cue document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueMetadata {
    #[serde(default)]
    pub sound_file: String,

    #[serde(default, deserialize_with = "de_seconds", serialize_with = "ser_seconds")]
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireCue {
    #[serde(deserialize_with = "de_seconds", serialize_with = "ser_seconds")]
    start: f64,
    #[serde(deserialize_with = "de_seconds", serialize_with = "ser_seconds")]
    end: f64,
    value: MouthShape,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    #[serde(default)]
    metadata: Option<CueMetadata>,
    mouth_cues: Option<Vec<WireCue>>,
}

/// A complete recognizer result.
#[derive(Debug, Clone, PartialEq)]
pub struct CueDocument {
    pub metadata: CueMetadata,
    pub cues: Vec<MouthCue>,
}

impl CueDocument {
    /// Build a document whose duration is the last cue's end.
    pub fn new(cues: Vec<MouthCue>, sound_file: impl Into<String>, version: Option<String>) -> Self {
        let duration = cues.last().map(|cue| cue.end).unwrap_or(0.0);
        Self {
            metadata: CueMetadata {
                sound_file: sound_file.into(),
                duration,
                version,
            },
            cues,
        }
    }

    /// Parse the stdout cue document.
    pub fn parse(stdout: &str) -> LipsyncResult<Self> {
        let wire: WireDocument = serde_json::from_str(stdout.trim())
            .map_err(|e| LipsyncError::protocol(format!("invalid cue document: {e}")))?;

        let mouth_cues = wire
            .mouth_cues
            .ok_or_else(|| LipsyncError::protocol("cue document has no mouthCues"))?;

        let cues = mouth_cues
            .into_iter()
            .enumerate()
            .map(|(idx, cue)| {
                if cue.end < cue.start {
                    Err(LipsyncError::protocol(format!(
                        "cue #{idx} ({}) ends at {} before it starts at {}",
                        cue.value, cue.end, cue.start
                    )))
                } else {
                    Ok(MouthCue::new(cue.value, cue.start, cue.end))
                }
            })
            .collect::<LipsyncResult<Vec<_>>>()?;

        let metadata = wire.metadata.unwrap_or(CueMetadata {
            sound_file: String::new(),
            duration: cues.last().map(|cue| cue.end).unwrap_or(0.0),
            version: None,
        });

        Ok(Self { metadata, cues })
    }

    /// Serialize back to the recognizer's document format.
    pub fn to_json(&self) -> LipsyncResult<String> {
        let wire = WireDocument {
            metadata: Some(self.metadata.clone()),
            mouth_cues: Some(
                self.cues
                    .iter()
                    .map(|cue| WireCue {
                        start: cue.start,
                        end: cue.end,
                        value: cue.shape,
                    })
                    .collect(),
            ),
        };
        Ok(serde_json::to_string_pretty(&wire)?)
    }

    /// Load a document from disk.
    pub fn load(path: &Path) -> LipsyncResult<Self> {
        if !path.exists() {
            return Err(LipsyncError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Write a document to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> LipsyncResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Parse the stdout cue document, keeping only the cues.
pub fn parse_final_document(stdout: &str) -> LipsyncResult<Vec<MouthCue>> {
    CueDocument::parse(stdout).map(|doc| doc.cues)
}

/// Serialize cues into a cue document.
pub fn serialize(cues: &[MouthCue], sound_file: &str, version: Option<&str>) -> LipsyncResult<String> {
    CueDocument::new(cues.to_vec(), sound_file, version.map(str::to_string)).to_json()
}

/// Seconds arrive as strings ("0.50") from the recognizer, as numbers from other tools.
fn de_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid seconds {text:?}: {e}"))),
    }
}

fn ser_seconds<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{value:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "metadata": {"soundFile": "/tmp/hello.wav", "duration": "2.00"},
        "mouthCues": [
            {"start": "0.00", "end": "0.50", "value": "X"},
            {"start": "0.50", "end": "0.60", "value": "A"},
            {"start": "0.60", "end": "2.00", "value": "X"}
        ]
    }"#;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Rhubarb Lip Sync version 1.13.0\n"), "1.13.0");
        assert_eq!(parse_version("version   2.0.11-beta"), "2.0.11");
        assert_eq!(parse_version("no version here"), "");
        assert_eq!(parse_version("version 1.2"), "");
        assert_eq!(parse_version(""), "");
    }

    #[test]
    fn test_parse_version_is_case_sensitive_and_unanchored() {
        assert_eq!(parse_version("Version 1.2.3"), "");
        assert_eq!(parse_version("subversion 4.5.6"), "4.5.6");
        assert_eq!(parse_version("version\n\t7.8.9"), "7.8.9");
        assert_eq!(parse_version("version1.2.3"), "");
        assert_eq!(parse_version("version x, version 3.0.1"), "3.0.1");
    }

    #[test]
    fn test_parse_progress_line() {
        let event = parse_status_line(r#"{"type":"progress","value":0.25}"#).unwrap();
        assert_eq!(event.kind, StatusKind::Progress(0.25));
        assert!(event.log.is_none());
    }

    #[test]
    fn test_parse_failure_line_with_log() {
        let event = parse_status_line(
            r#"{"type":"failure","reason":"bad audio","log":{"level":"Fatal","message":"bad audio"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, StatusKind::Failure("bad audio".to_string()));
        assert_eq!(event.log.unwrap().level, ToolLogLevel::Fatal);
    }

    #[test]
    fn test_log_is_relayed_for_any_type() {
        let event =
            parse_status_line(r#"{"type":"start","log":{"level":"Info","message":"hi"}}"#).unwrap();
        assert_eq!(event.kind, StatusKind::Start);
        assert_eq!(event.log.unwrap().message, "hi");

        let event = parse_status_line(r#"{"log":{"level":"Chatty","message":"?"}}"#).unwrap();
        assert_eq!(event.kind, StatusKind::Other);
        assert_eq!(event.log.unwrap().level, ToolLogLevel::Unknown);
    }

    #[test]
    fn test_malformed_status_lines_are_skipped() {
        assert!(parse_status_line("").is_none());
        assert!(parse_status_line("   ").is_none());
        assert!(parse_status_line("Segmentation fault").is_none());
        assert!(parse_status_line("{\"type\":").is_none());
    }

    #[test]
    fn test_parse_final_document() {
        let cues = parse_final_document(DOC).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[1], MouthCue::new(MouthShape::A, 0.5, 0.6));
    }

    #[test]
    fn test_numeric_times_are_accepted() {
        let cues =
            parse_final_document(r#"{"metadata":{},"mouthCues":[{"start":0.1,"end":0.2,"value":"B"}]}"#)
                .unwrap();
        assert_eq!(cues, vec![MouthCue::new(MouthShape::B, 0.1, 0.2)]);
    }

    #[test]
    fn test_missing_mouth_cues_is_protocol_error() {
        let err = parse_final_document(r#"{"metadata":{"soundFile":"a.wav"}}"#).unwrap_err();
        assert!(matches!(err, LipsyncError::Protocol { .. }));
    }

    #[test]
    fn test_unknown_shape_is_protocol_error() {
        let err = parse_final_document(r#"{"mouthCues":[{"start":"0","end":"1","value":"Q"}]}"#)
            .unwrap_err();
        assert!(matches!(err, LipsyncError::Protocol { .. }));
    }

    #[test]
    fn test_inverted_cue_is_protocol_error() {
        let err = parse_final_document(r#"{"mouthCues":[{"start":"1.0","end":"0.5","value":"A"}]}"#)
            .unwrap_err();
        assert!(matches!(err, LipsyncError::Protocol { .. }));
    }

    #[test]
    fn test_serialize_uses_two_decimal_strings() {
        let cues = vec![
            MouthCue::new(MouthShape::X, 0.0, 0.5),
            MouthCue::new(MouthShape::C, 0.5, 1.234),
        ];
        let json = serialize(&cues, "speech.wav", Some("1.13.0")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["metadata"]["soundFile"], "speech.wav");
        assert_eq!(value["metadata"]["duration"], "1.23");
        assert_eq!(value["metadata"]["version"], "1.13.0");
        assert_eq!(value["mouthCues"][1]["start"], "0.50");
        assert_eq!(value["mouthCues"][1]["end"], "1.23");
        assert_eq!(value["mouthCues"][1]["value"], "C");
    }

    #[test]
    fn test_serialize_empty_has_zero_duration_and_no_version() {
        let json = serialize(&[], "silent.wav", None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["duration"], "0.00");
        assert!(value["metadata"].get("version").is_none());
        assert_eq!(value["mouthCues"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_document_save_and_load() {
        let dir = std::env::temp_dir().join("lipsync_test_document");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("cues.json");

        let doc = CueDocument::parse(DOC).unwrap();
        doc.save(&path).unwrap();
        let loaded = CueDocument::load(&path).unwrap();
        assert_eq!(loaded.cues, doc.cues);
        assert_eq!(loaded.metadata.sound_file, "/tmp/hello.wav");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_document() {
        let err = CueDocument::load(Path::new("/nonexistent/lipsync/cues.json")).unwrap_err();
        assert!(matches!(err, LipsyncError::FileNotFound { .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serialized_cues_parse_back_within_a_centisecond(
                spans in prop::collection::vec((0.0f64..600.0, 0.001f64..5.0, 0usize..9), 0..20),
            ) {
                let cues: Vec<MouthCue> = spans
                    .iter()
                    .map(|(start, len, shape)| MouthCue::new(MouthShape::ALL[*shape], *start, start + len))
                    .collect();
                let json = serialize(&cues, "line.wav", Some("1.13.0")).unwrap();
                let parsed = parse_final_document(&json).unwrap();

                prop_assert_eq!(parsed.len(), cues.len());
                for (back, cue) in parsed.iter().zip(&cues) {
                    prop_assert_eq!(back.shape, cue.shape);
                    prop_assert!((back.start - cue.start).abs() <= 0.005 + 1e-9);
                    prop_assert!((back.end - cue.end).abs() <= 0.005 + 1e-9);
                }
            }
        }
    }
}
