use clap::Parser;
use colored::*;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streamgate::buffer::Buffer;
use streamgate::config::GatewayConfig;
use streamgate::logging::{init_tracing, request_span, setup_panic_hook};
use streamgate::main_helper::{load_history, AppState, Args, Command};
use streamgate::midjourney::{HttpTaskClient, TaskOrchestrator};
use streamgate::processor::format_vision_messages;
use streamgate::streaming::{fragments_from_reader, StreamHandler};
use streamgate::*;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

fn print_chunk(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn replay(
    state: &AppState,
    file: &Path,
    model: &str,
    legacy: bool,
    history: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let history = format_vision_messages(model, load_history(history)?);
    let mut buffer = Buffer::new(model, &history, state.quota.clone());
    let images: Vec<Image> = history
        .iter()
        .flat_map(|m| m.attachments.iter().cloned())
        .collect();
    buffer.set_images(images);

    let reader = tokio::fs::File::open(file).await?;
    StreamHandler::handle_stream(
        fragments_from_reader(reader),
        &mut buffer,
        legacy,
        cancel,
        print_chunk,
    )
    .await?;
    println!();

    if let Some(calls) = buffer.tool_calls() {
        eprintln!(
            "{} {}",
            "tool calls:".bold().cyan(),
            serde_json::to_string(calls)?
        );
    }
    eprintln!(
        "{} {} writes | {} input tokens | {} output tokens | quota {:.4}",
        "summary:".bold().green(),
        buffer.write_count(),
        buffer.count_input_tokens(),
        buffer.count_output_tokens(),
        buffer.get_quota()
    );
    Ok(())
}

async fn imagine(
    state: &AppState,
    prompt: &str,
    model: &str,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = Arc::new(state.config.midjourney.clone());
    if !config.is_midjourney_model(model) {
        tracing::warn!(
            "[MIDJOURNEY] Unknown model {}, using mode {}",
            model,
            config.default_mode
        );
    }
    let client = HttpTaskClient::new(state.client.clone(), &config)?;
    let orchestrator = TaskOrchestrator::new(client, config);

    let task_cancel = cancel.child_token();
    let deadline = task_cancel.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("[MIDJOURNEY] Timed out after {}s, cancelling", timeout_secs);
        deadline.cancel();
    });

    let result = orchestrator
        .create_stream_task(model, &[Message::user(prompt)], &task_cancel, print_chunk)
        .await;
    timer.abort();

    let snapshot = result?;
    eprintln!(
        "{} task {} ({})",
        "done:".bold().green(),
        snapshot.task_id,
        snapshot.action
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = match init_tracing(&args.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging in {}: {}", args.log_dir.display(), e);
            std::process::exit(1);
        }
    };
    setup_panic_hook();

    let config = match GatewayConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            eprintln!("{} {}", "error:".bold().red(), e);
            std::process::exit(1);
        }
    };

    let state = match AppState::new(args, config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling");
            on_signal.cancel();
        }
    });

    let result = match &state.args.command {
        Command::Replay {
            file,
            model,
            legacy,
            history,
        } => {
            replay(&state, file, model, *legacy, history.as_deref(), &cancel)
                .instrument(request_span(model))
                .await
        }
        Command::Imagine {
            prompt,
            model,
            timeout_secs,
        } => {
            imagine(&state, prompt, model, *timeout_secs, &cancel)
                .instrument(request_span(model))
                .await
        }
    };

    if let Err(e) = result {
        tracing::error!("{} ({})", e, e.inner.code());
        eprintln!("{} {} ({})", "error:".bold().red(), e, e.inner.code());
        std::process::exit(1);
    }
}
