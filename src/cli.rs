//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::voice::{Formality, DEFAULT_MAX_RECONNECT_ATTEMPTS};

#[derive(Parser)]
#[command(
    name = "voxlate",
    version,
    about = "Client for the Voxlate translation service: text, documents, glossaries, and real-time speech"
)]
pub struct Cli {
    /// Verbose logging (repeat for more detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Translate text.
    Translate {
        /// Text to translate.
        #[arg(required = true)]
        text: Vec<String>,
        /// Target language code.
        #[arg(long = "to")]
        to: String,
        /// Source language code (omit to auto-detect).
        #[arg(long = "from")]
        from: Option<String>,
        #[arg(long, value_enum)]
        formality: Option<FormalityArg>,
        /// Glossary id to apply.
        #[arg(long)]
        glossary: Option<String>,
    },

    /// Stream a local audio source for real-time speech translation.
    Voice(VoiceArgs),

    /// Translate a document (upload, wait, download).
    Document {
        file: PathBuf,
        #[arg(long = "to")]
        to: String,
        /// Where to write the translated document (default: alongside the
        /// input with the target language appended).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Manage glossaries.
    Glossary {
        #[command(subcommand)]
        action: GlossaryAction,
    },

    /// Manage the local configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions.
    Completions { shell: clap_complete::Shell },
}

#[derive(clap::Args)]
pub struct VoiceArgs {
    /// Audio file to stream, or `-` for stdin.
    pub input: String,

    /// Target language code(s), up to five.
    #[arg(long = "to", required = true)]
    pub to: Vec<String>,

    /// Source language code (omit to auto-detect).
    #[arg(long = "from")]
    pub from: Option<String>,

    /// Source language detection mode hint.
    #[arg(long)]
    pub source_mode: Option<String>,

    /// Audio content type; detected from the file extension when omitted.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Audio chunk size in bytes.
    #[arg(long, default_value_t = crate::voice::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Delay between chunk deliveries in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub chunk_interval_ms: u64,

    /// Disable automatic reconnection after an unexpected close.
    #[arg(long)]
    pub no_reconnect: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    #[arg(long, value_enum)]
    pub formality: Option<FormalityArg>,

    /// Glossary id to apply.
    #[arg(long)]
    pub glossary: Option<String>,

    /// Print the final result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum GlossaryAction {
    /// List stored glossaries.
    List,
    /// Create a glossary from `key=value` entries.
    Create {
        name: String,
        #[arg(long = "from")]
        from: String,
        #[arg(long = "to")]
        to: String,
        /// Comma-separated `source=target` pairs.
        #[arg(long, value_delimiter = ',')]
        entries: Vec<String>,
    },
    /// Delete a glossary by id.
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Store the service auth key.
    SetKey { key: String },
    /// Show the effective configuration (auth key masked).
    Show,
    /// Print the config file path.
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormalityArg {
    More,
    Less,
}

impl From<FormalityArg> for Formality {
    fn from(arg: FormalityArg) -> Self {
        match arg {
            FormalityArg::More => Formality::More,
            FormalityArg::Less => Formality::Less,
        }
    }
}

/// Guess the audio content type from a file extension. The streaming
/// endpoint needs one; headerless sources must pass `--content-type`.
pub fn detect_content_type(input: &str) -> Option<&'static str> {
    let extension = std::path::Path::new(input)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match extension.as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "ogg" => Some("audio/ogg"),
        "opus" => Some("audio/opus"),
        "flac" => Some("audio/flac"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "webm" => Some("audio/webm"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn detects_common_audio_extensions() {
        assert_eq!(detect_content_type("talk.wav"), Some("audio/wav"));
        assert_eq!(detect_content_type("talk.MP3"), Some("audio/mpeg"));
        assert_eq!(detect_content_type("dir/talk.flac"), Some("audio/flac"));
    }

    #[test]
    fn unknown_or_missing_extension_yields_none() {
        assert_eq!(detect_content_type("talk.xyz"), None);
        assert_eq!(detect_content_type("-"), None);
        assert_eq!(detect_content_type("raw-pcm"), None);
    }

    #[test]
    fn voice_args_parse_with_defaults() {
        let cli = Cli::try_parse_from(["voxlate", "voice", "talk.wav", "--to", "de"]).unwrap();
        let Command::Voice(args) = cli.command else {
            panic!("expected voice command");
        };
        assert_eq!(args.chunk_size, crate::voice::DEFAULT_CHUNK_SIZE);
        assert_eq!(args.chunk_interval_ms, 200);
        assert_eq!(args.max_reconnect_attempts, 3);
        assert!(!args.no_reconnect);
        assert_eq!(args.to, vec!["de"]);
    }

    #[test]
    fn voice_accepts_multiple_targets() {
        let cli = Cli::try_parse_from([
            "voxlate", "voice", "-", "--to", "de", "--to", "fr", "--content-type", "audio/wav",
        ])
        .unwrap();
        let Command::Voice(args) = cli.command else {
            panic!("expected voice command");
        };
        assert_eq!(args.to, vec!["de", "fr"]);
        assert_eq!(args.input, "-");
    }
}
