//! `microworker` binary: serve a registered application on an inherited or
//! freshly bound socket until the parent process goes away.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use microworker::{AppRegistry, Application, ServerError, Worker, WorkerConfig};

/// Exit code for configuration and application loading failures.
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "microworker", version, about = "Serve an application over HTTP/1.1")]
struct Cli {
    /// Application to serve, as `module:callable`
    app: String,

    /// Inherited file descriptor of a bound, listening TCP socket
    #[cfg(unix)]
    #[arg(long, conflicts_with = "bind")]
    fd: Option<i32>,

    /// Address to bind when no socket is inherited
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host name reported to the application
    #[arg(long)]
    server_name: Option<String>,

    /// Exit once this process is no longer our parent
    #[arg(long)]
    parent_pid: Option<u32>,

    /// Seconds allowed for reading one request
    #[arg(long)]
    timeout: Option<f64>,

    /// Maximum concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,
}

fn load_config(cli: &Cli) -> Result<WorkerConfig, ServerError> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };

    if let Some(name) = &cli.server_name {
        config.server_name = name.clone();
    }
    if let Some(pid) = cli.parent_pid {
        config.parent_pid = Some(pid);
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| ServerError::Config(format!("invalid timeout {secs}: {e}")))?;
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }

    config.validate()?;
    Ok(config)
}

fn open_listener(cli: &Cli) -> std::io::Result<std::net::TcpListener> {
    #[cfg(unix)]
    if let Some(fd) = cli.fd {
        use std::os::unix::io::FromRawFd;

        if fd < 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "negative file descriptor"));
        }
        info!("Using inherited socket fd {fd}");
        // SAFETY: the parent hands the descriptor over to this process and
        // nothing else in the process owns it.
        return Ok(unsafe { std::net::TcpListener::from_raw_fd(fd) });
    }

    std::net::TcpListener::bind(cli.bind)
}

fn serve(listener: std::net::TcpListener, app: Arc<dyn Application>, config: WorkerConfig) -> Result<(), ServerError> {
    // One thread: connections are multiplexed cooperatively on it.
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        let worker = Worker::new(listener, app, config)?.with_signal_handling();
        let reason = worker.run().await?;
        info!("Worker exiting: {reason}");
        Ok(())
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let registry = AppRegistry::with_demos();
    let app = match registry.resolve(&cli.app) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to load application: {e}");
            error!("Available applications: {}", registry.paths().join(", "));
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let listener = match open_listener(&cli) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to open listening socket: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Serving {app_path} as {name}", app_path = cli.app, name = config.server_name);
    match serve(listener, app, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Worker failed: {e}");
            ExitCode::FAILURE
        }
    }
}
