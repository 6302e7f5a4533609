mod console;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tether_backend::{BackendHandler, BackendSession, DapEngine};
use tether_config::{load_config, Config};
use tether_core::logging::{default_log_file_path, open_log_file, LogRotation};
use tether_platform::paths::find_project_root;
use tether_platform::{DefaultPaths, PlatformPaths};
use tether_rpc::RpcServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage:
  tether serve <adapter> <port>   run a debug backend on 127.0.0.1:<port>
  tether console [project-dir]    launch the project's debuggee and drive it";

fn load_settings(paths: Option<&DefaultPaths>, project: &Path) -> Config {
    let Some(paths) = paths else {
        return Config::default();
    };
    load_config(&paths.config_dir(), Some(project)).unwrap_or_else(|e| {
        eprintln!("tether: config load failed, using defaults: {e}");
        Config::default()
    })
}

/// Route tracing output to the log file so it never mixes with console
/// output.
fn init_logging(config: &Config, paths: Option<&DefaultPaths>) -> Result<()> {
    let path = match (&config.log.file, paths) {
        (Some(file), _) => file.clone(),
        (None, Some(paths)) => paths.log_file(),
        (None, None) => default_log_file_path(),
    };
    let file = open_log_file(&path, LogRotation::default())
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn serve(config: &Config, adapter: &str, port: u16) -> Result<()> {
    let session = BackendSession::with_exit_grace(
        DapEngine::new(adapter),
        config.backend.exit_grace(),
    );
    let server = RpcServer::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind 127.0.0.1:{port}"))?;
    session.attach_server(server.shutdown_handle());
    info!(adapter, port, "backend listening");
    server
        .serve(Arc::new(BackendHandler::new(session)))
        .await
        .context("backend server failed")?;
    info!("backend stopped");
    Ok(())
}

async fn run(args: Vec<String>) -> Result<()> {
    let paths = DefaultPaths::new()
        .map_err(|e| eprintln!("tether: {e}, using built-in defaults"))
        .ok();
    let paths = paths.as_ref();
    match args.first().map(String::as_str) {
        Some("serve") => {
            let [adapter, port] = &args[1..] else {
                bail!("{USAGE}");
            };
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port {port:?}"))?;
            let cwd = env::current_dir().context("no working directory")?;
            let config = load_settings(paths, &cwd);
            init_logging(&config, paths)?;
            let result = serve(&config, adapter, port).await;
            if let Err(e) = &result {
                error!("{e:#}");
            }
            result
        }
        Some("console") if args.len() <= 2 => {
            let start = match args.get(1) {
                Some(dir) => PathBuf::from(dir),
                None => env::current_dir().context("no working directory")?,
            };
            let start = start
                .canonicalize()
                .with_context(|| format!("no such project directory {}", start.display()))?;
            let project = find_project_root(&start).unwrap_or(start);
            let config = load_settings(paths, &project);
            init_logging(&config, paths)?;
            console::run(config, project).await
        }
        _ => bail!("{USAGE}"),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(args).await {
        eprintln!("tether: {e:#}");
        std::process::exit(1);
    }
}
