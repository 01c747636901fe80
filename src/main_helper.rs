use crate::config::GatewayConfig;
use crate::pricing::QuotaTable;
use crate::types::*;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON gateway config. Built-in defaults when absent.
    #[arg(long, env = "STREAMGATE_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
    #[arg(long, default_value_t = 30)]
    pub connect_timeout_secs: u64,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed a captured SSE stream through the parser and print the text.
    Replay {
        file: PathBuf,
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,
        /// Decode completion-style (`choices[].text`) chunks.
        #[arg(long, default_value_t = false)]
        legacy: bool,
        /// JSON array of messages billed as the prompt.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Run an image task and stream its markdown to stdout.
    Imagine {
        prompt: String,
        #[arg(long, default_value = "midjourney")]
        model: String,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub config: Arc<GatewayConfig>,
    pub quota: Arc<QuotaTable>,
    pub args: Arc<Args>,
}

impl AppState {
    pub fn new(args: Args, config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(args.connect_timeout_secs))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            quota: Arc::new(config.quota.clone()),
            config: Arc::new(config),
            args: Arc::new(args),
        })
    }
}

/// Prompt history for a replay: a JSON array of messages, empty when absent.
pub fn load_history(path: Option<&Path>) -> Result<Vec<Message>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(path)?;
    let messages: Vec<Message> = serde_json::from_str(&raw)?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay_args() {
        let args = Args::try_parse_from(["streamgate", "replay", "capture.sse", "--legacy"]).unwrap();
        match args.command {
            Command::Replay {
                file, model, legacy, ..
            } => {
                assert_eq!(file, PathBuf::from("capture.sse"));
                assert_eq!(model, "gpt-3.5-turbo");
                assert!(legacy);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_load_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"role":"user","content":"hello"}]"#).unwrap();

        let history = load_history(Some(&path)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert!(load_history(None).unwrap().is_empty());
    }
}
