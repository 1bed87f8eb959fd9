// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use taskd::cli::client::{read_auth_token, DaemonClient};
use taskd::{auth, cli, config::TaskdConfig, ipc, store::TaskStore, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "taskd",
    about = "taskd — minimal task-tracking RPC daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "TASKD_PORT")]
    port: Option<u16>,

    /// Data directory for the config file and auth token
    #[arg(long, env = "TASKD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1)
    #[arg(long, env = "TASKD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs taskd in the foreground until SIGTERM or Ctrl-C.
    ///
    /// Examples:
    ///   taskd serve
    ///   taskd
    Serve,
    /// Liveness check against a running daemon.
    Ping,
    /// Show daemon status (version, uptime, task count).
    Status,
    /// Call the greeting endpoint (the daemon answers after a fixed delay).
    ///
    /// Useful for exercising client-side deadlines: with `--timeout-ms`
    /// below the daemon's configured delay, the call fails DeadlineExceeded.
    Greet {
        /// Name to greet
        name: String,
        /// Client-side deadline in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Create, fetch, and page through tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task with a server-generated id (retries transient failures).
    ///
    /// Examples:
    ///   taskd task create "buy milk"
    ///   taskd task create "buy milk" tonight before the shop closes
    Create {
        title: String,
        /// Description; multiple words are joined with spaces
        description: Vec<String>,
    },
    /// Create a task with an explicit id.
    CreateWithId {
        id: String,
        title: String,
        /// Description; multiple words are joined with spaces
        description: Vec<String>,
    },
    /// Fetch a task by id.
    Get { id: String },
    /// List tasks a page at a time.
    ///
    /// Pass the previous response's next page token to continue; an empty
    /// token in the response means the last page was reached.
    List {
        /// Page size (server default 10, max 100)
        #[arg(long)]
        page_size: Option<i64>,
        /// Offset token from a previous list call
        #[arg(long, default_value = "")]
        page_token: String,
    },
    /// Arm the one-shot failure injector (operator/test hook).
    ///
    /// The daemon's next task.create fails Unavailable, then the flag
    /// disarms itself.
    FailNext,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TaskdConfig::resolve(
        args.port,
        args.data_dir.clone(),
        args.log.clone(),
        args.bind_address.clone(),
    );

    match args.command {
        None | Some(Command::Serve) => run_serve(config, args.log_file.as_deref()).await,
        Some(command) => run_client(command, &config).await,
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

async fn run_serve(config: TaskdConfig, log_file: Option<&std::path::Path>) -> Result<()> {
    let _guard = setup_logging(&config.log, log_file, &config.log_format);

    let auth_token = match config.auth_token.clone() {
        Some(token) => token,
        None => auth::get_or_create_token(&config.data_dir)?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        data_dir = %config.data_dir.display(),
        "starting taskd"
    );

    let ctx = Arc::new(AppContext {
        config: Arc::new(config),
        store: Arc::new(TaskStore::new()),
        started_at: std::time::Instant::now(),
        auth_token,
    });

    ipc::run(ctx).await
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format)
/// or `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("taskd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

// ─── Client commands ─────────────────────────────────────────────────────────

async fn run_client(command: Command, config: &TaskdConfig) -> Result<()> {
    let token = match &config.auth_token {
        Some(token) => token.clone(),
        None => read_auth_token(&config.data_dir)?,
    };
    let client = DaemonClient::new(config.port, token);

    let result = match command {
        Command::Ping => cli::ping(&client).await,
        Command::Status => cli::status(&client).await,
        Command::Greet { name, timeout_ms } => {
            let client = client.with_timeout(std::time::Duration::from_millis(timeout_ms));
            cli::greet(&client, &name).await
        }
        Command::Task { action } => match action {
            TaskAction::Create { title, description } => {
                cli::task_create(&client, &title, &description.join(" ")).await
            }
            TaskAction::CreateWithId {
                id,
                title,
                description,
            } => cli::task_create_with_id(&client, &id, &title, &description.join(" ")).await,
            TaskAction::Get { id } => cli::task_get(&client, &id).await,
            TaskAction::List {
                page_size,
                page_token,
            } => cli::task_list(&client, page_size, &page_token).await,
            TaskAction::FailNext => cli::task_fail_next(&client).await,
        },
        Command::Serve => unreachable!("serve is handled in main"),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
