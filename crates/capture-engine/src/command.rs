//! Recognizer command lines.

use std::path::{Path, PathBuf};

use lipsync_common::config::{ExecutableConfig, Recognizer};

/// Capture-mode invocation of the recognizer for one audio file.
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    /// Recognizer executable.
    pub executable: PathBuf,

    /// Audio file to analyze.
    pub input: PathBuf,

    /// Recognition engine.
    pub recognizer: Recognizer,

    /// Extended shapes to enable, e.g. "GHX". Empty disables them.
    pub extended_shapes: String,

    /// Dialog text that helps recognition.
    pub dialog_file: Option<PathBuf>,
}

impl CaptureCommand {
    pub fn new(executable: impl Into<PathBuf>, input: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            input: input.into(),
            recognizer: Recognizer::default(),
            extended_shapes: "GHX".to_string(),
            dialog_file: None,
        }
    }

    /// Build from the configured executable settings.
    pub fn from_config(config: &ExecutableConfig, input: impl Into<PathBuf>) -> Self {
        Self {
            executable: config.path.clone(),
            input: input.into(),
            recognizer: config.recognizer,
            extended_shapes: config.extended_shapes.clone(),
            dialog_file: config.dialog_file.clone(),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Recognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_extended_shapes(mut self, shapes: impl Into<String>) -> Self {
        self.extended_shapes = shapes.into();
        self
    }

    pub fn with_dialog_file(mut self, path: Option<PathBuf>) -> Self {
        self.dialog_file = path;
        self
    }

    /// Arguments following the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "json".to_string(),
            "--machineReadable".to_string(),
            "--extendedShapes".to_string(),
            self.extended_shapes.clone(),
            "-r".to_string(),
            self.recognizer.cli_name().to_string(),
        ];
        if let Some(dialog) = &self.dialog_file {
            args.push("--dialogFile".to_string());
            args.push(path_arg(dialog));
        }
        args.push(path_arg(&self.input));
        args
    }

    /// Full argv, executable first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![path_arg(&self.executable)];
        argv.extend(self.args());
        argv
    }
}

/// Arguments for version mode.
pub fn version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_argv_layout() {
        let cmd = CaptureCommand::new("/opt/rhubarb/rhubarb", "/tmp/line.wav");
        assert_eq!(
            cmd.argv(),
            vec![
                "/opt/rhubarb/rhubarb",
                "-f",
                "json",
                "--machineReadable",
                "--extendedShapes",
                "GHX",
                "-r",
                "pocketSphinx",
                "/tmp/line.wav",
            ]
        );
    }

    #[test]
    fn test_dialog_file_precedes_input() {
        let cmd = CaptureCommand::new("rhubarb", "line.wav")
            .with_recognizer(Recognizer::Phonetic)
            .with_extended_shapes("")
            .with_dialog_file(Some(PathBuf::from("line.txt")));
        let args = cmd.args();
        assert_eq!(args[4], "");
        assert_eq!(args[6], "phonetic");
        assert_eq!(&args[7..], &["--dialogFile", "line.txt", "line.wav"]);
    }

    #[test]
    fn test_from_config() {
        let config = ExecutableConfig {
            path: PathBuf::from("/usr/bin/rhubarb"),
            recognizer: Recognizer::Phonetic,
            extended_shapes: "GX".to_string(),
            dialog_file: None,
        };
        let cmd = CaptureCommand::from_config(&config, "a.wav");
        assert_eq!(cmd.executable, PathBuf::from("/usr/bin/rhubarb"));
        assert_eq!(cmd.extended_shapes, "GX");
        assert_eq!(cmd.args().last().unwrap(), "a.wav");
    }

    #[test]
    fn test_version_args() {
        assert_eq!(version_args(), vec!["--version"]);
    }
}
