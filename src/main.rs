//! blob-attr-cache - command line front end for the cached B2 client
//!
//! Each invocation authorizes with B2, wraps the client in the attribute
//! cache and runs one command. Results go to stdout as JSON, logs to stderr.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use blob_attr_cache::b2::B2Client;
use blob_attr_cache::{CacheConfig, CacheError, CachedBlobClient};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Show properties of one or more objects
    Stat { bucket: String, paths: Vec<String> },
    /// Check whether an object exists
    Exists { bucket: String, path: String },
    /// List objects under a prefix
    List {
        bucket: String,
        prefix: String,
        recursive: bool,
    },
    /// Classify a directory prefix
    IsEmpty { bucket: String, prefix: String },
    /// Upload a local file
    Upload {
        bucket: String,
        source: PathBuf,
        path: String,
    },
    /// Download an object to a local file
    Download {
        bucket: String,
        path: String,
        dest: PathBuf,
    },
    /// Delete an object
    Remove { bucket: String, path: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"blob-attr-cache - Cached metadata and resilient listing for Backblaze B2

USAGE:
    blob-attr-cache stat <bucket> <path>...
    blob-attr-cache exists <bucket> <path>
    blob-attr-cache ls <bucket> [prefix] [--recursive]
    blob-attr-cache is-empty <bucket> <prefix>
    blob-attr-cache upload <bucket> <local_file> <path>
    blob-attr-cache download <bucket> <path> <local_file>
    blob-attr-cache rm <bucket> <path>
    blob-attr-cache help

COMMANDS:
    stat       Print object properties as JSON (repeated paths hit the cache)
    exists     Print true or false
    ls         List a prefix, one level deep unless --recursive (Ctrl+C stops)
    is-empty   Print not_exist, empty or not_empty for a directory prefix
    upload     Upload a local file
    download   Download an object, replacing the local file atomically
    rm         Delete the current version of an object
    help       Show this help message

ENVIRONMENT:
    B2_KEY_ID                     B2 application key ID
    B2_KEY                        B2 application key
    BLOBCACHE_ATTR_CACHE          Enable the attribute cache (default true)
    BLOBCACHE_ATTR_TTL_SECS       Attribute TTL in seconds (default 120)
    BLOBCACHE_LIST_MAX_FAILURES   Consecutive page failures tolerated (default 20)
    BLOBCACHE_LIST_BACKOFF_MS     Initial delay between page retries (default none)
    RUST_LOG                      Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };

    let usage = |text: &str| anyhow!("Usage: blob-attr-cache {}", text);

    match command.as_str() {
        "stat" => {
            if args.len() < 3 {
                return Err(usage("stat <bucket> <path>..."));
            }
            Ok(Command::Stat {
                bucket: args[1].clone(),
                paths: args[2..].to_vec(),
            })
        }
        "exists" => {
            if args.len() != 3 {
                return Err(usage("exists <bucket> <path>"));
            }
            Ok(Command::Exists {
                bucket: args[1].clone(),
                path: args[2].clone(),
            })
        }
        "ls" => {
            let recursive = args.iter().any(|a| a == "--recursive" || a == "-r");
            let positional: Vec<&String> =
                args[1..].iter().filter(|a| !a.starts_with('-')).collect();
            match positional.as_slice() {
                [bucket] => Ok(Command::List {
                    bucket: bucket.to_string(),
                    prefix: String::new(),
                    recursive,
                }),
                [bucket, prefix] => Ok(Command::List {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    recursive,
                }),
                _ => Err(usage("ls <bucket> [prefix] [--recursive]")),
            }
        }
        "is-empty" => {
            if args.len() != 3 {
                return Err(usage("is-empty <bucket> <prefix>"));
            }
            Ok(Command::IsEmpty {
                bucket: args[1].clone(),
                prefix: args[2].clone(),
            })
        }
        "upload" => {
            if args.len() != 4 {
                return Err(usage("upload <bucket> <local_file> <path>"));
            }
            Ok(Command::Upload {
                bucket: args[1].clone(),
                source: PathBuf::from(&args[2]),
                path: args[3].clone(),
            })
        }
        "download" => {
            if args.len() != 4 {
                return Err(usage("download <bucket> <path> <local_file>"));
            }
            Ok(Command::Download {
                bucket: args[1].clone(),
                path: args[2].clone(),
                dest: PathBuf::from(&args[3]),
            })
        }
        "rm" => {
            if args.len() != 3 {
                return Err(usage("rm <bucket> <path>"));
            }
            Ok(Command::Remove {
                bucket: args[1].clone(),
                path: args[2].clone(),
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

/// Directory prefixes are listed with a trailing separator
fn as_directory(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect() -> Result<CachedBlobClient<B2Client>> {
    let key_id = env::var("B2_KEY_ID").context("B2_KEY_ID is not set")?;
    let key = env::var("B2_KEY").context("B2_KEY is not set")?;
    let config = CacheConfig::from_env().context("Invalid cache configuration")?;

    let b2_client = B2Client::authorize(&key_id, &key)
        .await
        .context("Failed to authorize with B2")?;
    Ok(CachedBlobClient::new(b2_client, config))
}

async fn run(command: Command) -> Result<()> {
    let client = connect().await?;

    match command {
        Command::Stat { bucket, paths } => {
            for path in &paths {
                let props = client
                    .get_properties(&bucket, path)
                    .await
                    .with_context(|| format!("Failed to stat {}", path))?;
                print_json(&serde_json::json!({ "name": path, "properties": props }))?;
            }
        }
        Command::Exists { bucket, path } => {
            println!("{}", client.exists(&bucket, &path).await?);
        }
        Command::List {
            bucket,
            prefix,
            recursive,
        } => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received interrupt, stopping listing...");
                    on_ctrl_c.cancel();
                }
            });

            let delimiter = (!recursive).then_some("/");
            match client
                .list_all_cancellable(&bucket, delimiter, &prefix, &cancel)
                .await
            {
                Ok(items) => print_json(&items)?,
                Err(CacheError::Cancelled) => {
                    info!("Listing cancelled");
                    return Ok(());
                }
                Err(e) => return Err(anyhow::Error::new(e).context("Failed to list")),
            }
        }
        Command::IsEmpty { bucket, prefix } => {
            let prefix = as_directory(&prefix);
            let state = client.is_directory_empty(&bucket, Some("/"), &prefix).await?;
            print_json(&state)?;
        }
        Command::Upload {
            bucket,
            source,
            path,
        } => {
            let props = client
                .upload_file(&bucket, &path, &source, &[])
                .await
                .with_context(|| format!("Failed to upload {}", source.display()))?;
            print_json(&props)?;
        }
        Command::Download { bucket, path, dest } => {
            let size = client
                .download_to_file(&bucket, &path, &dest)
                .await
                .with_context(|| format!("Failed to download {}", path))?;
            info!(path = %path, dest = %dest.display(), size = size, "Download complete");
        }
        Command::Remove { bucket, path } => {
            client
                .delete(&bucket, &path)
                .await
                .with_context(|| format!("Failed to delete {}", path))?;
        }
        Command::Help => print_help(),
    }

    client.log_metrics();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_args() {
        Ok(cmd) => cmd,
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

    if let Err(e) = run(command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
