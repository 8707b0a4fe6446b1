use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the postdesk binary.
#[derive(Debug, Parser)]
#[command(name = "postdesk", version, about = "Blog post admin client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "POSTDESK_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List posts, loading one or more pages.
    List(ListArgs),
    /// Show a single post.
    Show(ShowArgs),
    /// Change a post title through the list's inline edit.
    Rename(RenameArgs),
    /// Submit the edit form for a post.
    Edit(EditArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Number of pages to load.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// Print the rendered HTML table instead of JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub html: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    pub id: i64,

    /// Print the rendered edit form instead of JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub html: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RenameArgs {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Args, Clone)]
pub struct EditArgs {
    pub id: i64,

    /// New title; defaults to the current one.
    #[arg(long)]
    pub title: Option<String>,

    /// New content; defaults to the current one.
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read the new content from a file.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_file: Option<PathBuf>,

    /// Published checkbox; defaults to the current status.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub published: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the API base URL.
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Override the API request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}
