mod ax;
mod config;
mod desktop;
mod dispatch;
mod error;
mod history;
mod llm;
mod locate;
mod opener;
mod platform;
mod sender;
#[cfg(test)]
mod testing;
mod tools;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use config::AiConfig;
use history::FetchOptions;
use llm::ChatCompletionClient;
use platform::NativeDesktop;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::Path;
use tools::{ReplyRequest, ToolOptions, ToolResponse};
use tracing_subscriber::EnvFilter;

const PLUGIN_ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[derive(Parser, Debug)]
#[command(
    name = "wechat-assist",
    version,
    about = "Read WeChat chats through the macOS accessibility tree and reply with LLM-drafted messages"
)]
struct Cli {
    /// Bundle identifier of the target app (default: $WECHAT_ASSIST_BUNDLE_ID, then WeChat)
    #[arg(long, global = true)]
    bundle_id: Option<String>,
    /// Log at debug level regardless of $WECHAT_ASSIST_LOG
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print plugin manifest JSON
    Manifest,
    /// Open a chat and print its most recent messages as JSON
    #[command(name = "fetch-messages")]
    FetchMessages(FetchArgs),
    /// Open a chat, draft a reply with the configured model and send it
    Reply(ReplyArgs),
    /// Open a chat from the session list or via search
    #[command(name = "open-chat")]
    OpenChat(ContactArgs),
    /// Open a chat and send the given text
    #[command(name = "send-message")]
    SendMessage(SendArgs),
}

#[derive(Args, Debug)]
struct ContactArgs {
    /// Chat display name as shown in the session list
    contact: String,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Chat display name as shown in the session list
    contact: String,
    /// Number of newest messages to return
    #[arg(long, default_value_t = 50)]
    last_n: usize,
    /// Upper bound on scroll-and-capture steps
    #[arg(long, default_value_t = 80)]
    max_scrolls: u32,
}

#[derive(Args, Debug)]
struct ReplyArgs {
    /// Chat display name as shown in the session list
    contact: String,
    /// Extra guidance appended to the prompt (tone, language, length)
    #[arg(long)]
    instructions: Option<String>,
    /// Number of newest messages given to the model
    #[arg(long, default_value_t = 50)]
    last_n: usize,
    /// Print the drafted reply without sending it
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Chat display name as shown in the session list
    contact: String,
    /// Message text to send
    text: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let bundle_id = config::bundle_id(cli.bundle_id.as_deref());

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Manifest => print_manifest(),
        Commands::FetchMessages(args) => command_fetch_messages(&bundle_id, args),
        Commands::Reply(args) => command_reply(&bundle_id, args),
        Commands::OpenChat(args) => command_open_chat(&bundle_id, args),
        Commands::SendMessage(args) => command_send_message(&bundle_id, args),
    }
}

// stdout carries the JSON result, so logs go to stderr.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(config::ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn commands_payload() -> Value {
    let rows = vec![
        json!({
            "name": "fetch-messages",
            "description": "Open a chat and return its newest messages with ME/OTHER/UNKNOWN senders.",
            "runner": "rust"
        }),
        json!({
            "name": "reply",
            "description": "Draft a reply to a chat with an OpenAI-compatible model and send it.",
            "runner": "rust"
        }),
        json!({
            "name": "open-chat",
            "description": "Open a chat from the session list, falling back to global search.",
            "runner": "rust"
        }),
        json!({
            "name": "send-message",
            "description": "Type a message into a chat and confirm it left the input field.",
            "runner": "rust"
        }),
    ];
    json!({ "commands": rows })
}

fn print_commands() -> Result<()> {
    print_json(&commands_payload())
}

fn read_manifest(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("manifest not found: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid manifest JSON: {}", path.display()))
}

fn print_manifest() -> Result<()> {
    let payload = read_manifest(&Path::new(PLUGIN_ROOT).join("manifest.json"))?;
    print_json(&payload)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Connects to the desktop and runs one tool; a failed connection is reported
/// the same way as a failed tool call.
fn with_desktop<T, F>(bundle_id: &str, tool: &str, contact: &str, run_tool: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&NativeDesktop) -> ToolResponse<T>,
{
    let response = match NativeDesktop::connect(bundle_id) {
        Ok(desktop) => run_tool(&desktop),
        Err(err) => ToolResponse::failed(tool, contact, err.into()),
    };
    print_json(&response)
}

fn fetch_options(last_n: usize, max_scrolls: u32) -> ToolOptions {
    ToolOptions {
        fetch: FetchOptions {
            max_scrolls,
            ..FetchOptions::with_last_n(last_n)
        },
        ..ToolOptions::default()
    }
}

fn command_fetch_messages(bundle_id: &str, args: FetchArgs) -> Result<()> {
    let options = fetch_options(args.last_n, args.max_scrolls);
    with_desktop(bundle_id, "fetch_messages", &args.contact, |desktop| {
        tools::fetch_messages(desktop, &args.contact, &options)
    })
}

fn command_reply(bundle_id: &str, args: ReplyArgs) -> Result<()> {
    let options = fetch_options(args.last_n, FetchOptions::default().max_scrolls);
    let request = ReplyRequest {
        instructions: args.instructions,
        dry_run: args.dry_run,
    };
    with_desktop(bundle_id, "reply_to_contact", &args.contact, |desktop| {
        tools::reply_to_contact(desktop, &args.contact, &request, &options, || -> Result<_> {
            ChatCompletionClient::new(AiConfig::from_env()?)
        })
    })
}

fn command_open_chat(bundle_id: &str, args: ContactArgs) -> Result<()> {
    with_desktop(bundle_id, "open_chat", &args.contact, |desktop| {
        tools::open_chat(desktop, &args.contact, &ToolOptions::default())
    })
}

fn command_send_message(bundle_id: &str, args: SendArgs) -> Result<()> {
    with_desktop(bundle_id, "send_message", &args.contact, |desktop| {
        tools::send_to_contact(desktop, &args.contact, &args.text, &ToolOptions::default())
    })
}
