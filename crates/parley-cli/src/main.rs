use std::borrow::Cow::{self, Borrowed, Owned};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use colored::Colorize;
use rustyline::Editor;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use parley_core::session::{
    Message, MessageRole, OutgoingAttachment, SendOutcome, SessionController, SessionSnapshot,
};
use parley_gateway::{GatewayConfig, HttpGateway};

const COMMANDS: &[&str] = &["/list", "/open", "/new", "/delete", "/attach", "/help"];

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley - interactive client for the task-dispatch chat backend", long_about = None)]
struct Cli {
    /// Base URL of the backend (overrides config file and environment)
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer token for the authenticated session
    #[arg(long)]
    token: Option<String>,

    /// User name the conversation directory is scoped to
    #[arg(long, default_value = "me")]
    user: String,
}

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper;

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.to_string(),
                    replacement: cmd.to_string(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            COMMANDS
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::load()?;
    if let Some(url) = cli.server_url {
        config.server_url = url.trim_end_matches('/').to_string();
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }

    let gateway = Arc::new(HttpGateway::new(config));
    let controller = SessionController::new(gateway);
    controller.set_identity(Some(cli.user.clone())).await;

    println!("{}", "=== Parley ===".bright_magenta().bold());
    println!(
        "{}",
        "Type a message to send it, '/help' for commands, or 'quit' to exit.".bright_black()
    );
    println!();
    print_directory(&controller.snapshot().await);

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CliHelper));

    // Files staged with /attach, consumed by the next send.
    let mut staged: Vec<OutgoingAttachment> = Vec::new();

    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                if trimmed.starts_with('/') {
                    handle_command(&controller, trimmed, &mut staged).await;
                    continue;
                }

                let attachments = std::mem::take(&mut staged);
                match controller.send(trimmed, &attachments).await {
                    SendOutcome::Sent => {
                        let snap = controller.snapshot().await;
                        if let Some(message) = snap.messages.last() {
                            print_message(message);
                        }
                    }
                    SendOutcome::Skipped => {
                        println!("{}", "Send skipped (another send is in flight)".yellow());
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(
    controller: &SessionController<HttpGateway>,
    line: &str,
    staged: &mut Vec<OutgoingAttachment>,
) {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).unwrap_or_default();

    match command {
        "/help" => {
            println!("{}", "Commands:".bright_black());
            println!("{}", "  /list          show your conversations".bright_black());
            println!("{}", "  /open <n>      open conversation n from the list".bright_black());
            println!("{}", "  /new           start a new conversation".bright_black());
            println!("{}", "  /delete <n>    delete conversation n from the list".bright_black());
            println!("{}", "  /attach <path> attach a file to the next message".bright_black());
        }
        "/list" => {
            if let Err(err) = controller.refresh().await {
                eprintln!("{}", format!("Could not refresh conversations: {err}").red());
            }
            print_directory(&controller.snapshot().await);
        }
        "/open" => {
            let Some(id) = resolve_index(controller, argument).await else {
                return;
            };
            match controller.load_conversation(&id).await {
                Ok(()) => {
                    let snap = controller.snapshot().await;
                    println!(
                        "{}",
                        format!("Opened {} ({} messages)", id, snap.messages.len()).bright_green()
                    );
                    for message in &snap.messages {
                        print_message(message);
                    }
                }
                Err(err) => eprintln!("{}", format!("Could not open conversation: {err}").red()),
            }
        }
        "/new" => {
            controller.start_new_conversation().await;
            println!("{}", "Started a new conversation".bright_green());
        }
        "/delete" => {
            let Some(id) = resolve_index(controller, argument).await else {
                return;
            };
            match controller.remove(&id).await {
                Ok(()) => println!("{}", format!("Deleted {id}").bright_green()),
                Err(err) => eprintln!("{}", format!("Could not delete conversation: {err}").red()),
            }
        }
        "/attach" => match stage_attachment(argument) {
            Ok(attachment) => {
                println!(
                    "{}",
                    format!(
                        "Attached {} ({} bytes, {})",
                        attachment.filename,
                        attachment.bytes.len(),
                        attachment.mime_type
                    )
                    .bright_green()
                );
                staged.push(attachment);
            }
            Err(err) => eprintln!("{}", format!("{err:#}").red()),
        },
        _ => println!("{}", "Unknown command (try /help)".bright_black()),
    }
}

/// Maps a 1-based directory index from the last `/list` onto a conversation id.
async fn resolve_index(
    controller: &SessionController<HttpGateway>,
    argument: &str,
) -> Option<String> {
    let snap = controller.snapshot().await;
    let Ok(index) = argument.parse::<usize>() else {
        println!("{}", "Expected a conversation number (see /list)".yellow());
        return None;
    };
    match index.checked_sub(1).and_then(|i| snap.conversations.get(i)) {
        Some(entry) => Some(entry.conversation_id.clone()),
        None => {
            println!("{}", "No such conversation (see /list)".yellow());
            None
        }
    }
}

fn stage_attachment(path: &str) -> Result<OutgoingAttachment> {
    let path = PathBuf::from(path);
    let bytes = fs::read(&path).with_context(|| format!("Could not read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Path has no file name")?;
    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(OutgoingAttachment {
        filename,
        mime_type,
        bytes,
    })
}

fn print_directory(snapshot: &SessionSnapshot) {
    if snapshot.conversations.is_empty() {
        println!("{}", "No conversations yet".bright_black());
        return;
    }
    for (index, entry) in snapshot.conversations.iter().enumerate() {
        let marker = if snapshot.deleting_ids.contains(&entry.conversation_id) {
            " (deleting)".red().to_string()
        } else {
            String::new()
        };
        println!(
            "{} {}{}",
            format!("{:>3}.", index + 1).bright_black(),
            format!(
                "{} [{} messages, {}]",
                entry.display_preview(),
                entry.message_count,
                entry.last_updated
            ),
            marker
        );
    }
}

fn print_message(message: &Message) {
    match message.role {
        MessageRole::User => {
            println!("{}", format!("> {}", message.content).green());
        }
        MessageRole::Assistant => {
            for line in message.content.lines() {
                println!("{}", line.bright_blue());
            }
            if let Some(file) = &message.attached_file {
                match save_artifact(&file.filename, &file.content) {
                    Ok(path) => {
                        let kind = if file.is_image { "image" } else { "file" };
                        println!(
                            "{}",
                            format!("Saved {} {} to {}", kind, file.filename, path.display())
                                .bright_magenta()
                        );
                    }
                    Err(err) => eprintln!("{}", format!("{err:#}").red()),
                }
            }
        }
        MessageRole::Error => {
            println!("{}", message.content.red());
        }
    }
}

/// Decodes a base64 artifact into the working directory.
fn save_artifact(filename: &str, base64_content: &str) -> Result<PathBuf> {
    let bytes = BASE64
        .decode(base64_content.trim())
        .with_context(|| format!("Could not decode {filename}"))?;
    let path = PathBuf::from(filename);
    fs::write(&path, bytes).with_context(|| format!("Could not save {filename}"))?;
    Ok(path)
}
