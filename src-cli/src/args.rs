use anyhow::{bail, Result};
use std::path::PathBuf;

pub const USAGE: &str = "\
usage:
  melograph analyze <audio.wav> [notes.json]   extract notes from a recording
  melograph play <notes.json>                  replay a note file (Enter stops)
  melograph devices                            list audio outputs

Settings are read from <config dir>/melograph/settings.json.
Set RUST_LOG=debug for segmenter decisions.";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Analyze {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    Play {
        notes: PathBuf,
    },
    Devices,
    Help,
}

impl CliCommand {
    /// Parses the arguments after the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let Some(command) = args.next() else {
            return Ok(CliCommand::Help);
        };
        let rest: Vec<String> = args.collect();

        let parsed = match (command.as_str(), rest.as_slice()) {
            ("analyze", [input]) => CliCommand::Analyze {
                input: PathBuf::from(input),
                output: None,
            },
            ("analyze", [input, output]) => CliCommand::Analyze {
                input: PathBuf::from(input),
                output: Some(PathBuf::from(output)),
            },
            ("play", [notes]) => CliCommand::Play {
                notes: PathBuf::from(notes),
            },
            ("devices", []) => CliCommand::Devices,
            ("help" | "-h" | "--help", _) => CliCommand::Help,
            ("analyze" | "play" | "devices", _) => {
                bail!("wrong number of arguments for `{command}`\n\n{USAGE}")
            }
            _ => bail!("unknown command `{command}`\n\n{USAGE}"),
        };
        Ok(parsed)
    }
}
