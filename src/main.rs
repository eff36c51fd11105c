use book_generator::state::GenerationStateManager;
use book_generator::{run_pipeline, Config, GenerationRequest};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn usage() -> &'static str {
    "usage: book-generator-cli --subject <text> [--genre <g>] [--profile <p>] [--style <s>] \
     [--model <provider:model>] [--output-format <fmt>] [--output-path <path>]"
}

struct Args {
    subject: String,
    genre: Option<String>,
    profile: String,
    style: Option<String>,
    model: Option<String>,
    output_format: Option<String>,
    output_path: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut subject = None;
    let mut genre = None;
    let mut profile = None;
    let mut style = None;
    let mut model = None;
    let mut output_format = None;
    let mut output_path = None;

    let mut raw = std::env::args().skip(1);
    while let Some(flag) = raw.next() {
        let value = raw.next().ok_or_else(|| format!("missing value for {flag}"))?;
        match flag.as_str() {
            "--subject" => subject = Some(value),
            "--genre" => genre = Some(value),
            "--profile" => profile = Some(value),
            "--style" => style = Some(value),
            "--model" => model = Some(value),
            "--output-format" => output_format = Some(value),
            "--output-path" => output_path = Some(value),
            other => return Err(format!("unrecognized flag: {other}")),
        }
    }

    Ok(Args {
        subject: subject.ok_or("--subject is required")?,
        genre,
        profile: profile.unwrap_or_else(|| "general audience".to_string()),
        style,
        model,
        output_format,
        output_path,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "book_generator=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n{}", usage());
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let request = GenerationRequest {
        subject: args.subject,
        profile: args.profile,
        style: args.style.unwrap_or_else(|| config.writing_style.clone()),
        genre: args.genre.unwrap_or_else(|| config.genre.clone()),
        model: args.model,
        output_format: args.output_format,
        output_path: args.output_path,
    };

    let state = Arc::new(GenerationStateManager::new());
    state.subscribe(Arc::new(book_generator::state::LoggingObserver));

    let book_id = uuid::Uuid::new_v4().to_string();
    match run_pipeline(config, request, book_id, state).await {
        Ok(artifact) => {
            println!("{}", serde_json::to_string_pretty(&artifact).unwrap_or_else(|_| artifact.title.clone()));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("generation failed: {err}");
            ExitCode::FAILURE
        }
    }
}
