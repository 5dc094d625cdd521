//! dropboxfs - command-line access to a Dropbox account
//!
//! Each invocation runs one filesystem operation through `DropboxFs`.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::io::{self, Write};
use tokio::runtime::Runtime;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dropboxfs::{DropboxFs, FsConfig, ListOptions};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Print metadata as JSON
    Info { path: String, fresh: bool },
    /// List a folder
    List { path: String, options: ListOptions },
    /// Create a folder
    MakeDir { path: String },
    /// Delete a file
    Remove { path: String },
    /// Delete a folder recursively
    RemoveDir { path: String },
    /// Move or rename
    Move { src: String, dst: String },
    /// Copy
    Copy { src: String, dst: String },
    /// Write a file to stdout
    Cat { path: String },
    /// Upload stdin to a file
    Put { path: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"dropboxfs - Dropbox as a filesystem

USAGE:
    dropboxfs [--token <token>] <command> [args]

COMMANDS:
    info <path> [--fresh]       Show metadata (--fresh bypasses the cache)
    ls <path> [--dirs|--files] [--wildcard <pattern>] [--absolute]
    mkdir <path>                Create a folder
    rm <path>                   Delete a file
    rmdir <path>                Delete a folder and its contents
    mv <src> <dst>              Move or rename
    cp <src> <dst>              Copy
    cat <path>                  Write a file to stdout
    put <path>                  Upload stdin to a file
    help                        Show this help message

EXAMPLES:
    dropboxfs ls /Photos --wildcard '*.jpg'
    echo hello | dropboxfs put /notes/hello.txt

ENVIRONMENT:
    DROPBOX_TOKEN        OAuth2 access token (alternative to --token)
    DROPBOX_CACHE_TTL    Metadata cache TTL in seconds (0 disables caching)
    DROPBOX_MAX_BUFFER   Upload bytes kept in memory before spilling to disk
    DROPBOX_MAX_RETRIES  Retries for idempotent requests
    RUST_LOG             Log level (trace, debug, info, warn, error)
"#
    );
}

/// Pull `--token <value>` out of the argument list
fn take_token(args: &mut Vec<String>) -> Result<Option<String>> {
    match args.iter().position(|a| a == "--token") {
        Some(idx) => {
            if idx + 1 >= args.len() {
                return Err(anyhow!("--token needs a value"));
            }
            let token = args.remove(idx + 1);
            args.remove(idx);
            Ok(Some(token))
        }
        None => Ok(None),
    }
}

fn parse_list(args: &[String]) -> Result<Command> {
    let mut path = None;
    let mut options = ListOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dirs" => options.dirs_only = true,
            "--files" => options.files_only = true,
            "--absolute" => options.absolute = true,
            "--wildcard" => {
                let pattern = iter
                    .next()
                    .ok_or_else(|| anyhow!("--wildcard needs a pattern"))?;
                options.wildcard = Some(pattern.clone());
            }
            other if path.is_none() => path = Some(other.to_string()),
            other => return Err(anyhow!("Unexpected argument: {}", other)),
        }
    }

    Ok(Command::List {
        path: path.unwrap_or_else(|| "/".to_string()),
        options,
    })
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    let one = |usage: &str| -> Result<String> {
        match rest.first() {
            Some(path) => Ok(path.clone()),
            None => Err(anyhow!("Usage: dropboxfs {}", usage)),
        }
    };
    let two = |usage: &str| -> Result<(String, String)> {
        match rest {
            [src, dst, ..] => Ok((src.clone(), dst.clone())),
            _ => Err(anyhow!("Usage: dropboxfs {}", usage)),
        }
    };

    match command.as_str() {
        "info" => Ok(Command::Info {
            path: one("info <path> [--fresh]")?,
            fresh: rest.iter().any(|a| a == "--fresh"),
        }),
        "ls" => parse_list(rest),
        "mkdir" => Ok(Command::MakeDir {
            path: one("mkdir <path>")?,
        }),
        "rm" => Ok(Command::Remove {
            path: one("rm <path>")?,
        }),
        "rmdir" => Ok(Command::RemoveDir {
            path: one("rmdir <path>")?,
        }),
        "mv" => {
            let (src, dst) = two("mv <src> <dst>")?;
            Ok(Command::Move { src, dst })
        }
        "cp" => {
            let (src, dst) = two("cp <src> <dst>")?;
            Ok(Command::Copy { src, dst })
        }
        "cat" => Ok(Command::Cat {
            path: one("cat <path>")?,
        }),
        "put" => Ok(Command::Put {
            path: one("put <path>")?,
        }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

fn run(fs: &DropboxFs<dropboxfs::DropboxClient>, command: Command) -> Result<()> {
    match command {
        Command::Info { path, fresh } => {
            let info = if fresh {
                fs.info_uncached(&path)?
            } else {
                fs.info(&path)?
            };
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::List { path, options } => {
            for name in fs.listdir(&path, &options)? {
                println!("{}", name);
            }
        }
        Command::MakeDir { path } => {
            let info = fs.makedir(&path)?;
            info!(path = %info.path, "Created folder");
        }
        Command::Remove { path } => fs.remove(&path)?,
        Command::RemoveDir { path } => fs.removedir(&path)?,
        Command::Move { src, dst } => {
            let info = fs.move_entry(&src, &dst)?;
            info!(from = %src, to = %info.path, "Moved");
        }
        Command::Copy { src, dst } => {
            let info = fs.copy(&src, &dst)?;
            info!(from = %src, to = %info.path, "Copied");
        }
        Command::Cat { path } => {
            let mut reader = fs.open_read(&path)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)?;
            stdout.flush()?;
        }
        Command::Put { path } => {
            let mut writer = fs.open_write(&path)?;
            let mut stdin = io::stdin().lock();
            io::copy(&mut stdin, &mut writer)?;
            let info = writer.finish()?;
            info!(path = %info.path, size = info.size, "Uploaded");
        }
        Command::Help => print_help(),
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args: Vec<String> = env::args().skip(1).collect();
    let parsed = take_token(&mut args).and_then(|token| Ok((token, parse_args(&args)?)));
    let (token, command) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };
    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let token = match token.or_else(|| env::var("DROPBOX_TOKEN").ok()) {
        Some(token) => token,
        None => {
            eprintln!("Error: no access token; pass --token or set DROPBOX_TOKEN");
            std::process::exit(1);
        }
    };

    let config = FsConfig::resolve().context("Failed to load configuration")?;

    // The adapter blocks on this runtime, so main itself stays synchronous
    let runtime = Runtime::new()?;
    let fs = DropboxFs::connect(&token, runtime.handle().clone(), config)?;

    let result = run(&fs, command);
    fs.close();
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
