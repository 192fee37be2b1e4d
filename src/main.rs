use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use kiro_relay::config::{load_config, AppConfig};
use kiro_relay::error::format_error;
use kiro_relay::observability::init_tracing;
use kiro_relay::protocol::canonical::{DeliveryMode, TargetDialect};
use kiro_relay::translator::{TranslationRequest, Translator};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(name = "kiro-relay")]
#[command(about = "Translate a raw Kiro upstream body into an OpenAI or Anthropic response")]
struct Cli {
    /// YAML config; `config.yaml` is used when present and this is omitted
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Target::Openai)]
    target: Target,
    /// Emit SSE frames instead of one payload
    #[arg(long, default_value_t = false)]
    stream: bool,
    /// Client-facing model name
    #[arg(long, default_value = "claude-sonnet-4-5")]
    model: String,
    #[arg(long, default_value_t = 0, value_name = "N")]
    prompt_tokens: i64,
    /// Estimated from the output when omitted
    #[arg(long, value_name = "N")]
    completion_tokens: Option<i64>,
    /// Upstream body; stdin when omitted or `-`
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    #[value(alias = "open_ai_chat")]
    Openai,
    Anthropic,
}

impl From<Target> for TargetDialect {
    fn from(target: Target) -> Self {
        match target {
            Target::Openai => TargetDialect::OpenAiChat,
            Target::Anthropic => TargetDialect::Anthropic,
        }
    }
}

impl Cli {
    fn mode(&self) -> DeliveryMode {
        if self.stream {
            DeliveryMode::Streaming
        } else {
            DeliveryMode::OneShot
        }
    }
}

fn main() {
    let args = Cli::parse();
    let target = TargetDialect::from(args.target);

    let config = resolve_config(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    init_tracing(&config.features.log_level, config.features.log_format);

    let body = read_input(args.input.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to read upstream body: {e}");
        std::process::exit(1);
    });

    let translator = Translator::new(&config.translator);
    tracing::info!(
        "translating {} bytes for model '{}' (upstream '{}')",
        body.len(),
        args.model,
        translator.upstream_model(&args.model)
    );

    let mut request = TranslationRequest::new(&args.model, target, args.mode())
        .with_prompt_tokens(args.prompt_tokens);
    if let Some(completion_tokens) = args.completion_tokens {
        request = request.with_completion_tokens(completion_tokens);
    }

    match translator.translate(&body, &request) {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout
                .write_all(&output.into_bytes())
                .and_then(|()| stdout.flush())
            {
                eprintln!("Failed to write output: {e}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            let (status, payload) = format_error(&err, target);
            eprintln!("{status}: {payload}");
            std::process::exit(1);
        }
    }
}

/// An explicit path must load; the default path is optional.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig, kiro_relay::config::ConfigError> {
    match path {
        Some(path) => load_config(&path.to_string_lossy()),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => Ok(AppConfig::default()),
    }
}

fn read_input(path: Option<&Path>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read(path),
        _ => {
            let mut body = Vec::new();
            io::stdin().lock().read_to_end(&mut body)?;
            Ok(body)
        }
    }
}
