use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "meethub")]
#[command(about = "Meethub command line client - sessions, cached requests and route checks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = "MEETHUB_API_URL")]
    pub api_url: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login(LoginArgs),
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Remove the stored session
    Logout,
    /// Show the stored session
    Status,
    /// GET one or more paths concurrently through the request pipeline
    Get(GetArgs),
    /// Show the backend app config
    Config,
    /// Check whether the current session may navigate to a route
    Guard(GuardArgs),
}

#[derive(Args)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub email: String,
    /// Prompted for when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub name: String,
    /// Prompted for when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Paths relative to the API base URL, e.g. `projects` or `meetings/42`
    #[arg(required = true)]
    pub paths: Vec<String>,
    /// Query parameter added to every request (repeatable)
    #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub query: Vec<(String, String)>,
}

#[derive(Args)]
pub struct GuardArgs {
    /// Route path, e.g. `/admin/users`
    pub path: String,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
