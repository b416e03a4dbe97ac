use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use treelog::ReaderOptions;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "treelog", about = "Inspect treelog record streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every record as one JSON object per line
    Dump(DumpArgs),
    /// Decode a whole stream and print a summary
    Check(CheckArgs),
}

#[derive(Args, Clone, Debug)]
pub struct InputArgs {
    /// Stream to read, `-` for stdin
    pub input: String,

    /// Path to the TOML config file
    #[arg(long, default_value = "treelog.toml", env = "TREELOG_CONFIG")]
    pub config: String,

    /// Initial read buffer size in bytes
    #[arg(long, env = "TREELOG_BUFFER")]
    pub buffer: Option<usize>,

    /// Largest accepted chunk in bytes
    #[arg(long, env = "TREELOG_MAX_CHUNK")]
    pub max_chunk: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Indent each JSON object
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    pub pretty: Option<bool>,
}

pub fn load_config(path: &str) -> Result<Config, CliError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("cannot read {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| CliError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  Effective: config file < env/CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Effective {
    pub input: String,
    pub reader: ReaderOptions,
    pub pretty: bool,
}

impl Effective {
    pub fn new(args: &InputArgs, pretty: bool) -> Result<Self, CliError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, pretty, cfg)
    }

    fn merge(args: &InputArgs, pretty: bool, cfg: Config) -> Result<Self, CliError> {
        // no static types are linked in, every type is already generic
        if cfg.reader.forced_dynamic {
            return Err(CliError::Config(format!(
                "{}: reader.forced_dynamic is not supported by the command line tool",
                args.config
            )));
        }
        let reader = ReaderOptions {
            initial_capacity: args.buffer.unwrap_or(cfg.reader.initial_capacity),
            max_chunk_len: args.max_chunk.unwrap_or(cfg.reader.max_chunk_len),
            ..cfg.reader
        };
        Ok(Self {
            input: args.input.clone(),
            reader,
            pretty: pretty || cfg.output.pretty.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> InputArgs {
        InputArgs {
            input: "-".into(),
            config: "missing.toml".into(),
            buffer: None,
            max_chunk: Some(1024),
        }
    }

    #[test]
    fn cli_overrides_file() {
        let cfg: Config = toml::from_str(
            "[reader]\ninitial_capacity = 512\nmax_chunk_len = 4096\n\n[output]\npretty = true\n",
        )
        .unwrap();
        let eff = Effective::merge(&args(), false, cfg).unwrap();
        assert_eq!(eff.reader.initial_capacity, 512);
        assert_eq!(eff.reader.max_chunk_len, 1024);
        assert!(eff.pretty);
    }

    #[test]
    fn forced_dynamic_is_rejected() {
        let cfg: Config = toml::from_str("[reader]\nforced_dynamic = true\n").unwrap();
        let err = Effective::merge(&args(), false, cfg).unwrap_err();
        assert!(matches!(err, CliError::Config(_)), "{err}");
        assert!(err.to_string().contains("forced_dynamic"), "{err}");
    }

    #[test]
    fn missing_default_file_is_not_an_error() {
        let eff = Effective::new(&args(), false).unwrap();
        assert_eq!(eff.reader.initial_capacity, ReaderOptions::default().initial_capacity);
        assert!(!eff.pretty);
    }
}
