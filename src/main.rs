//! mosaicterm-session - run shell commands through the session engine
//!
//! Reads commands from stdin, one per line, runs each in a single long-lived
//! shell session and prints the captured output followed by an exit footer.

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use mosaicterm_session::{
    init_logging, Completion, ConfigLoader, ConnectionTarget, SessionEvent, SessionRegistry,
    NAME, VERSION,
};

/// Command line options
#[derive(Debug, Default)]
struct CliArgs {
    /// Shell to drive
    shell: Option<String>,
    /// Force a PTY-backed session
    pty: bool,
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug logging
    debug: bool,
}

impl CliArgs {
    fn parse() -> anyhow::Result<Self> {
        let mut args = env::args().skip(1);
        let mut cli = CliArgs::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--shell" | "-s" => {
                    cli.shell = Some(args.next().context("Missing shell name")?);
                }
                "--pty" | "-p" => cli.pty = true,
                "--config" | "-c" => {
                    let path = args.next().context("Missing config file path")?;
                    cli.config_path = Some(PathBuf::from(path));
                }
                "--debug" | "-d" => cli.debug = true,
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("{} v{}", NAME, VERSION);
                    process::exit(0);
                }
                other => bail!("Unknown option: {}", other),
            }
        }

        Ok(cli)
    }
}

fn print_help() {
    println!("{} - run shell commands with boundary detection", NAME);
    println!();
    println!("USAGE:");
    println!("    {} [OPTIONS] < commands.txt", NAME);
    println!();
    println!("OPTIONS:");
    println!("    -s, --shell <NAME>     Shell to drive (bash, zsh, sh, fish, pwsh, cmd, ...)");
    println!("    -p, --pty              Run the shell on a pseudoterminal");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("ENVIRONMENT:");
    println!("    MOSAICTERM_SESSION_CONFIG  Path to configuration file");
    println!("    MOSAICTERM_SESSION_DEBUG   Enable debug logging (1 or true)");
    println!("    RUST_LOG                   Set logging level (error, warn, info, debug, trace)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match CliArgs::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Failed to parse arguments: {}", e);
            print_help();
            process::exit(2);
        }
    };

    init_logging(args.debug);
    info!("Starting {} v{}", NAME, VERSION);

    let config = match &args.config_path {
        Some(path) => ConfigLoader::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigLoader::new().load()?,
    };

    let shell = args
        .shell
        .clone()
        .unwrap_or_else(|| config.session.default_shell.clone());
    let target = if args.pty {
        ConnectionTarget::pty()
    } else {
        ConnectionTarget::local()
    };

    let registry = SessionRegistry::new(config);
    let session = registry
        .create_session(&shell, target)
        .await
        .with_context(|| format!("Failed to start {} session", shell))?;
    let mut events = registry.subscribe(&session).await?;
    debug!("Session {} ready", session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_status = 0;
    let mut shell_exited = false;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = registry.run_command(&session, &line).await {
            eprintln!("error: {}", e);
            if e.is_recovered() {
                continue;
            }
            break;
        }

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling command");
                    registry.cancel(&session).await?;
                    continue;
                }
            };
            match event {
                Some(SessionEvent::Partial { text }) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                }
                Some(SessionEvent::Complete(outcome)) => {
                    if !outcome.output.is_empty() && !outcome.output.ends_with('\n') {
                        println!();
                    }
                    let status = outcome
                        .exit_status
                        .map_or("?".to_string(), |code| code.to_string());
                    match outcome.completion {
                        Completion::Marker => println!("[exit {}]", status),
                        other => println!("[exit {} ({:?})]", status, other),
                    }
                    last_status = outcome.exit_status.unwrap_or(1);
                    break;
                }
                Some(SessionEvent::Error { detail }) => eprintln!("warning: {}", detail),
                Some(SessionEvent::Exited { code }) => {
                    info!("Shell exited with {:?}", code);
                    shell_exited = true;
                }
                None => {
                    shell_exited = true;
                    break;
                }
            }
        }

        if shell_exited {
            break;
        }
    }

    registry.shutdown().await;
    info!("{} shutdown complete", NAME);
    process::exit(last_status);
}
