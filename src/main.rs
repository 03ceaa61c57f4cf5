use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use voxlate::api::ApiClient;
use voxlate::cli::{detect_content_type, Cli, Command, ConfigAction, GlossaryAction, VoiceArgs};
use voxlate::config::Config;
use voxlate::output::{print_translations, print_voice_result, LivePrinter};
use voxlate::voice::{
    AudioChunkSource, CancelSignal, ChunkPacer, ReconnectPolicy, SessionNegotiator,
    TransportConnector, VoiceSessionOptions, VoiceStreamSession, WsConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    match cli.command {
        Command::Translate {
            text,
            to,
            from,
            formality,
            glossary,
        } => {
            let client = api_client(&config)?;
            let formality = formality
                .map(|f| voxlate::voice::Formality::from(f).as_str().to_string())
                .or_else(|| config.formality.clone());
            let translations = client
                .translate_text(
                    &text,
                    &to,
                    from.as_deref(),
                    formality.as_deref(),
                    glossary.as_deref(),
                )
                .await?;
            print_translations(&translations);
        }

        Command::Voice(args) => run_voice(&config, args).await?,

        Command::Document { file, to, output } => {
            run_document(&config, &file, &to, output).await?;
        }

        Command::Glossary { action } => run_glossary(&config, action).await?,

        Command::Config { action } => run_config(action)?,

        Command::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxlate",
                &mut std::io::stdout(),
            );
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::new(config.api_url(), config.auth_key()?))
}

// ── voice ────────────────────────────────────────────────────────

async fn run_voice(config: &Config, args: VoiceArgs) -> anyhow::Result<()> {
    let content_type = args
        .content_type
        .clone()
        .or_else(|| detect_content_type(&args.input).map(String::from))
        .context("could not detect the audio content type; pass --content-type")?;

    let options = VoiceSessionOptions {
        source_language: args.from.clone(),
        source_language_mode: args.source_mode.clone(),
        target_languages: args.to.clone(),
        content_type,
        formality: args.formality.map(Into::into),
        glossary_id: args.glossary.clone(),
        reconnect: ReconnectPolicy {
            enabled: !args.no_reconnect,
            max_attempts: args.max_reconnect_attempts,
        },
    };

    let negotiator: Arc<dyn SessionNegotiator> = Arc::new(api_client(config)?);
    let connector: Arc<dyn TransportConnector> = Arc::new(WsConnector::default());
    let session = VoiceStreamSession::new(negotiator, connector, options)?;

    let source = if args.input == "-" {
        AudioChunkSource::stdin(args.chunk_size)
    } else {
        AudioChunkSource::open(Path::new(&args.input), args.chunk_size).await?
    };
    let pacer = ChunkPacer::new(source, Duration::from_millis(args.chunk_interval_ms));

    // First Ctrl-C drains gracefully so the server can flush final
    // transcripts; a second abandons the session.
    let cancel = CancelSignal::default();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping gracefully; press Ctrl-C again to abort");
            signal_cancel.graceful.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                signal_cancel.hard.cancel();
            }
        }
    });

    let mut observer = LivePrinter;
    let result = session.run(pacer, &mut observer, cancel).await?;
    print_voice_result(&result, args.json)
}

// ── document ─────────────────────────────────────────────────────

async fn run_document(
    config: &Config,
    file: &Path,
    to: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("document path has no file name")?;
    let contents = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let handle = client.upload_document(filename, contents, to).await?;
    tracing::info!(document_id = %handle.document_id, "document uploaded");

    loop {
        let status = client.document_status(&handle).await?;
        if status.is_done() {
            break;
        }
        if status.is_error() {
            anyhow::bail!(
                "document translation failed: {}",
                status.error_message.unwrap_or_else(|| "unknown".into())
            );
        }
        if let Some(seconds) = status.seconds_remaining {
            eprintln!("translating... (~{seconds}s remaining)");
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let translated = client.download_document(&handle).await?;
    let output = output.unwrap_or_else(|| {
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
        let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("out");
        file.with_file_name(format!("{stem}.{to}.{extension}"))
    });
    std::fs::write(&output, translated)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {}", output.display());
    Ok(())
}

// ── glossary ─────────────────────────────────────────────────────

async fn run_glossary(config: &Config, action: GlossaryAction) -> anyhow::Result<()> {
    let client = api_client(config)?;
    match action {
        GlossaryAction::List => {
            for glossary in client.list_glossaries().await? {
                println!(
                    "{}  {} ({} -> {}, {} entries)",
                    glossary.glossary_id,
                    glossary.name,
                    glossary.source_language,
                    glossary.target_language,
                    glossary.entry_count
                );
            }
        }
        GlossaryAction::Create {
            name,
            from,
            to,
            entries,
        } => {
            let mut parsed = BTreeMap::new();
            for entry in &entries {
                let (source, target) = entry
                    .split_once('=')
                    .with_context(|| format!("entry '{entry}' is not source=target"))?;
                parsed.insert(source.trim().to_string(), target.trim().to_string());
            }
            let glossary = client.create_glossary(&name, &from, &to, &parsed).await?;
            println!("created {}", glossary.glossary_id);
        }
        GlossaryAction::Delete { id } => {
            client.delete_glossary(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

// ── config ───────────────────────────────────────────────────────

fn run_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::SetKey { key } => {
            let mut config = Config::load()?;
            config.auth_key = Some(key);
            config.save()?;
            println!("auth key stored in {}", Config::path()?.display());
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            let masked = match &config.auth_key {
                Some(key) if key.len() > 4 => format!("...{}", &key[key.len() - 4..]),
                Some(_) => "[set]".into(),
                None => "[unset]".into(),
            };
            println!("auth_key = {masked}");
            println!("api_url  = {}", config.api_url());
            if let Some(formality) = &config.formality {
                println!("formality = {formality}");
            }
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
    }
    Ok(())
}
