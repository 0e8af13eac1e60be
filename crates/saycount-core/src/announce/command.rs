//! Speech through an external TTS program (`say`, `espeak-ng`, `espeak`,
//! `spd-say`, or anything else that takes the text as its last argument).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::Announcer;
use crate::error::AnnouncerError;
use crate::storage::AnnouncerConfig;

/// Programs probed on `PATH`, in order, when none is configured.
const CANDIDATES: &[&str] = &["say", "espeak-ng", "espeak", "spd-say"];

/// Command-line dialect of a speech program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechFlavor {
    /// macOS `say`: `-r <wpm> -v <voice>`
    Say,
    /// `espeak` / `espeak-ng`: `-s <wpm> -a <0..200> -v <voice>`
    Espeak,
    /// speech-dispatcher `spd-say`: `-w -i <-100..100> -t <voice type>`
    SpdSay,
    /// Unknown program: the utterance is the only argument
    Plain,
}

impl SpeechFlavor {
    pub fn for_program(program: &Path) -> Self {
        match program.file_stem().and_then(|s| s.to_str()) {
            Some("say") => SpeechFlavor::Say,
            Some("espeak") | Some("espeak-ng") => SpeechFlavor::Espeak,
            Some("spd-say") => SpeechFlavor::SpdSay,
            _ => SpeechFlavor::Plain,
        }
    }
}

/// Announcer that runs one speech-program process per utterance and waits
/// for it to exit.
#[derive(Debug, Clone)]
pub struct CommandAnnouncer {
    program: PathBuf,
    flavor: SpeechFlavor,
    rate: u32,
    volume: u32,
    voice: Option<String>,
}

impl CommandAnnouncer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            flavor: SpeechFlavor::for_program(&program),
            program,
            rate: 150,
            volume: 100,
            voice: None,
        }
    }

    /// Build from configuration, probing `PATH` when no program is set.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError::NoBackend`] when no program is configured and
    /// none of the known speech programs is installed.
    pub fn from_config(config: &AnnouncerConfig) -> Result<Self, AnnouncerError> {
        let program = match &config.program {
            Some(program) => PathBuf::from(program),
            None => find_on_path(CANDIDATES).ok_or_else(|| AnnouncerError::NoBackend {
                tried: CANDIDATES.join(", "),
            })?,
        };
        let mut announcer = Self::new(program);
        announcer.rate = config.rate;
        announcer.volume = config.volume.min(100);
        announcer.voice = config.voice.clone();
        Ok(announcer)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn flavor(&self) -> SpeechFlavor {
        self.flavor
    }

    fn args(&self, utterance: &str) -> Vec<String> {
        let mut args = Vec::new();
        match self.flavor {
            SpeechFlavor::Say => {
                args.extend(["-r".to_string(), self.rate.to_string()]);
                if let Some(voice) = &self.voice {
                    args.extend(["-v".to_string(), voice.clone()]);
                }
            }
            SpeechFlavor::Espeak => {
                args.extend(["-s".to_string(), self.rate.to_string()]);
                args.extend(["-a".to_string(), (self.volume * 2).to_string()]);
                if let Some(voice) = &self.voice {
                    args.extend(["-v".to_string(), voice.clone()]);
                }
            }
            SpeechFlavor::SpdSay => {
                args.push("-w".to_string());
                let volume = i64::from(self.volume) * 2 - 100;
                args.extend(["-i".to_string(), volume.to_string()]);
                if let Some(voice) = &self.voice {
                    args.extend(["-t".to_string(), voice.clone()]);
                }
            }
            SpeechFlavor::Plain => {}
        }
        args.push(utterance.to_string());
        args
    }
}

impl Announcer for CommandAnnouncer {
    fn speak(&mut self, utterance: &str) -> Result<(), AnnouncerError> {
        let program = self.program.display().to_string();
        let status = Command::new(&self.program)
            .args(self.args(utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| AnnouncerError::Spawn {
                program: program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(AnnouncerError::Failed {
                program,
                status: status.to_string(),
            })
        }
    }
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    names.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}
