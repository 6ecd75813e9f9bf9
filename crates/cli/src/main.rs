//! CLI entrypoint and subcommand orchestration.

mod config;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agent::ToolRegistry;
use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use proto::ToolResult;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tools::{ComputerTool, DisplayCapture, ShellTool, XdotoolDriver};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments for the computer-use tools.
#[derive(Parser)]
#[command(name = "computer-use")]
#[command(about = "Persistent shell and screen control tools", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.computer-use/logs/
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive loop over one persistent shell session
    Shell,
    /// Run a single shell command and print the result
    Run {
        /// Command to execute
        #[arg(short = 'e', long)]
        exec: String,
    },
    /// Perform one screen, mouse or keyboard action
    Computer {
        /// Action name, e.g. screenshot or left_click
        action: String,
        /// Text for key and type actions
        #[arg(short, long)]
        text: Option<String>,
        /// Target as X,Y in API coordinates
        #[arg(long, value_name = "X,Y")]
        coordinate: Option<String>,
    },
    /// Print the tool definitions as JSON
    Tools,
    /// Dispatch a raw tool call
    Call {
        /// Tool name
        tool: String,
        /// JSON arguments
        #[arg(default_value = "{}")]
        args: String,
    },
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Shell => "shell",
            Commands::Run { .. } => "run",
            Commands::Computer { .. } => "computer",
            Commands::Tools => "tools",
            Commands::Call { .. } => "call",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // With --debug, debug-level logs also go to ~/.computer-use/logs/debug.YYYY-MM-DD.log.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    if cli.debug {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let log_dir = std::path::PathBuf::from(home)
            .join(".computer-use")
            .join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);

        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter);
        let file = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(EnvFilter::new("debug"));
        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .init();

        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = cli.command.label(),
            log_level = %cli.log_level,
            "========== computer-use session start =========="
        );
    } else {
        _file_guard = None;
        fmt()
            .with_env_filter(console_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config ({e}), using defaults");
        Config::default()
    });

    match cli.command {
        Commands::Shell => cmd_shell(&config).await,
        Commands::Run { exec } => cmd_run(&config, exec).await,
        Commands::Computer {
            action,
            text,
            coordinate,
        } => cmd_computer(&config, action, text, coordinate).await,
        Commands::Tools => cmd_tools(&config).await,
        Commands::Call { tool, args } => cmd_call(&config, tool, args).await,
    }
}

/// Builds the shell tool from validated config.
fn build_shell(config: &Config) -> anyhow::Result<ShellTool> {
    let session = config
        .session_config()
        .context("invalid [shell] configuration")?;
    Ok(ShellTool::new(session))
}

/// Builds the computer tool, detecting the screen size unless overridden.
async fn build_computer(config: &Config) -> anyhow::Result<ComputerTool> {
    let settings = config
        .computer_settings()
        .context("invalid [computer] configuration")?;
    let driver = Arc::new(XdotoolDriver::new(settings.display_number));
    let capture = Arc::new(DisplayCapture::new(config.computer.capture_display));
    Ok(match config.screen_override() {
        Some(screen) => ComputerTool::new(driver, capture, screen, settings),
        None => ComputerTool::detect(driver, capture, settings).await,
    })
}

async fn build_registry(config: &Config) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(build_shell(config)?);
    registry.register(build_computer(config).await?);
    Ok(registry)
}

fn next_call_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("cli-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Line typed into the interactive shell loop.
#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Exit,
    Restart,
    Command(&'a str),
    Blank,
}

fn parse_repl_line(line: &str) -> ReplInput<'_> {
    match line.trim() {
        "/exit" | "/quit" => ReplInput::Exit,
        "/restart" => ReplInput::Restart,
        "" => ReplInput::Blank,
        _ => ReplInput::Command(line),
    }
}

async fn cmd_shell(config: &Config) -> anyhow::Result<()> {
    let shell = build_shell(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!(
        "{} session. /restart restarts it, /exit quits.",
        shell.config().flavor.name()
    );
    loop {
        stdout.write_all(b"$ ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let args = match parse_repl_line(&line) {
            ReplInput::Exit => break,
            ReplInput::Blank => continue,
            ReplInput::Restart => json!({ "restart": true }),
            ReplInput::Command(command) => json!({ "command": command }),
        };
        let result = tools::Tool::execute(&shell, &next_call_id(), args).await;
        print_result(&result);
    }

    shell.shutdown().await?;
    Ok(())
}

async fn cmd_run(config: &Config, exec: String) -> anyhow::Result<()> {
    let shell = build_shell(config)?;
    println!("{}", format_run_header(&exec));
    let result = tools::Tool::execute(&shell, &next_call_id(), json!({ "command": exec })).await;
    print_result(&result);
    if result.is_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_computer(
    config: &Config,
    action: String,
    text: Option<String>,
    coordinate: Option<String>,
) -> anyhow::Result<()> {
    let computer = build_computer(config).await?;
    let mut args = json!({ "action": action });
    if let Some(text) = text {
        args["text"] = json!(text);
    }
    if let Some(coordinate) = coordinate {
        args["coordinate"] = json!(parse_coordinate(&coordinate)?);
    }
    let result = tools::Tool::execute(&computer, &next_call_id(), args).await;
    print_result(&result);
    if result.is_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_tools(config: &Config) -> anyhow::Result<()> {
    let registry = build_registry(config).await?;
    let definitions = registry.definitions();
    println!("{}", serde_json::to_string_pretty(&definitions)?);
    Ok(())
}

async fn cmd_call(config: &Config, tool: String, args: String) -> anyhow::Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(&args).context("tool arguments must be valid JSON")?;
    let registry = build_registry(config).await?;
    let result = registry.execute(&next_call_id(), &tool, args).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.is_error {
        std::process::exit(1);
    }
    Ok(())
}

/// Parses `X,Y` into a coordinate pair.
fn parse_coordinate(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .with_context(|| format!("invalid coordinate component '{part}'"))
        })
        .collect()
}

fn print_result(result: &ToolResult) {
    if result.is_error {
        eprintln!("Error: {}", result.output.trim_end());
    } else if !result.output.is_empty() {
        println!("{}", result.output.trim_end());
    }
    if let Some(system) = &result.system {
        println!("[system] {system}");
    }
    if let Some(image) = &result.base64_image {
        println!("[image] {} base64 bytes", image.len());
    }
}

fn format_run_header(exec: &str) -> String {
    format!("Running: {exec}")
}
