use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use weft::api::{Service, Storage};
use weft::config::{Cli, Command};
use weft::{NamingServer, StorageServer, WeftError, WeftPath};

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Shell { stores, log_file } => {
            let _log_guard = init_logging(log_file);

            let naming = Arc::new(NamingServer::new());
            let mut servers = Vec::new();
            for store in &stores {
                let server = StorageServer::new(store);
                if let Err(e) = server.start(naming.as_ref()) {
                    eprintln!("Error: storage server at {}: {}", store.display(), e);
                    std::process::exit(1);
                }
                servers.push(server);
            }
            info!("cluster up: {} storage servers", servers.len());

            run_shell(&naming);

            for server in &servers {
                server.stop();
            }
        }
    }
}

fn init_logging(log_file: Option<PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("weft.log"));
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(false),
                )
                .with(fmt::layer().with_writer(io::stderr).with_target(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(fmt::layer().with_writer(io::stderr).with_target(false))
                .init();
            None
        }
    }
}

fn run_shell(naming: &NamingServer) {
    println!("weft shell - type 'help' for commands");
    let stdin = io::stdin();
    prompt();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            prompt();
            continue;
        };
        if verb == "quit" || verb == "exit" {
            break;
        }
        let args: Vec<&str> = words.collect();
        match run_command(naming, verb, &args) {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
        prompt();
    }
}

fn prompt() {
    print!("weft> ");
    let _ = io::stdout().flush();
}

fn run_command(naming: &NamingServer, verb: &str, args: &[&str]) -> weft::Result<String> {
    match verb {
        "help" => Ok(HELP.trim_end().to_string()),
        "status" => {
            let status = serde_json::json!({
                "storage_servers": naming.server_count(),
            });
            Ok(status.to_string())
        }
        "ls" => {
            let path = arg_path(args, 0)?;
            let mut names = with_lock(naming, &path, false, || naming.list(&path))?;
            names.sort();
            Ok(names.join("\n"))
        }
        "stat" => {
            let path = arg_path(args, 0)?;
            if naming.is_directory(&path)? {
                return Ok(format!("{}: directory", path));
            }
            let size = with_lock(naming, &path, false, || {
                naming.get_storage(&path)?.size(&path)
            })?;
            Ok(format!("{}: file, {} bytes", path, size))
        }
        "mkdir" => {
            let path = arg_path(args, 0)?;
            match naming.create_directory(&path)? {
                true => Ok(String::new()),
                false => Ok(format!("{}: already exists", path)),
            }
        }
        "touch" => {
            let path = arg_path(args, 0)?;
            match naming.create_file(&path)? {
                true => Ok(String::new()),
                false => Ok(format!("{}: already exists", path)),
            }
        }
        "rm" => {
            let path = arg_path(args, 0)?;
            match naming.delete(&path)? {
                true => Ok(String::new()),
                false => Ok(format!("{}: not fully deleted", path)),
            }
        }
        "put" => {
            let path = arg_path(args, 0)?;
            if args.len() < 2 {
                return Err(WeftError::Argument("usage: put <path> <text>".to_string()));
            }
            let text = args[1..].join(" ");
            // Replace rather than overwrite in place, so shorter content
            // does not leave a stale tail.
            match naming.delete(&path) {
                Ok(_) | Err(WeftError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            naming.create_file(&path)?;
            with_lock(naming, &path, true, || {
                naming.get_storage(&path)?.write(&path, 0, text.as_bytes())
            })?;
            Ok(String::new())
        }
        "get" => {
            let path = arg_path(args, 0)?;
            let data = with_lock(naming, &path, false, || {
                let storage = naming.get_storage(&path)?;
                let size = storage.size(&path)?;
                storage.read(&path, 0, size as usize)
            })?;
            Ok(String::from_utf8_lossy(&data).into_owned())
        }
        _ => Err(WeftError::Argument(format!(
            "unknown command {:?}, try 'help'",
            verb
        ))),
    }
}

fn arg_path(args: &[&str], index: usize) -> weft::Result<WeftPath> {
    let raw = args
        .get(index)
        .ok_or_else(|| WeftError::Argument("missing path argument".to_string()))?;
    WeftPath::parse(raw)
}

/// Lock a path around an operation, releasing it on both success and error.
fn with_lock<T>(
    naming: &NamingServer,
    path: &WeftPath,
    exclusive: bool,
    op: impl FnOnce() -> weft::Result<T>,
) -> weft::Result<T> {
    naming.lock(path, exclusive)?;
    let out = op();
    naming.unlock(path, exclusive)?;
    out
}

const HELP: &str = "\
commands:
  ls <path>            list a directory
  stat <path>          show kind and size
  mkdir <path>         create a directory
  touch <path>         create an empty file
  rm <path>            delete a file or directory tree
  put <path> <text>    write text to a file
  get <path>           print a file's contents
  status               cluster status as JSON
  quit                 exit
";
