//! CLI tool for inspecting and editing S3-backed checkpoint directories.

mod error;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::debug;
use s3_checkpoint_core::{
    CheckpointFileManager, S3CheckpointFileManager, StoreConfig,
    config::{
        ACCESS_KEY_KEY, ENDPOINT_KEY, PATH_STYLE_ACCESS_KEY, REGION_KEY, SECRET_KEY_KEY,
        SESSION_TOKEN_KEY,
    },
    manager::AcceptAll,
};
use snafu::{OptionExt, ResultExt};
use tokio::io::AsyncReadExt;

use crate::error::{
    CheckpointSnafu, CliResult, ConfigSnafu, ConnectSnafu, InvalidConfSnafu, ReadInputSnafu,
    WriteOutputSnafu,
};

#[derive(Debug, Args)]
struct StoreArgs {
    /// S3 endpoint URL (fs.s3a.endpoint)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Signing region (fs.s3a.region)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Use virtual-hosted-style bucket addressing instead of path style
    #[arg(long = "no-path-style", global = true, default_value_t = false)]
    no_path_style: bool,

    /// Extra fs.s3a.* property; repeatable
    #[arg(long = "conf", value_name = "KEY=VALUE", global = true)]
    conf: Vec<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", global = true, hide_env_values = true)]
    access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    secret_key: Option<String>,

    #[arg(long, env = "AWS_SESSION_TOKEN", global = true, hide_env_values = true)]
    session_token: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every checkpoint file under a prefix
    Ls { path: String },

    /// Atomically write a checkpoint file from stdin or --file
    Put {
        path: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print a checkpoint file to stdout
    Cat { path: String },

    /// Print whether a checkpoint file exists
    Exists { path: String },

    /// Delete a checkpoint file; succeeds if it is already gone
    Rm { path: String },

    /// Create a directory (no-op on object stores)
    Mkdirs { path: String },

    /// Print the checkpoint root a manager for PATH reports
    Root { path: String },
}

#[derive(Debug, Parser)]
#[command(name = "s3ckpt", version, about = "Atomic checkpoint files on S3-compatible stores")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    cmd: Command,
}

/// Merge `--conf` pairs and the dedicated flags into `fs.s3a.*` properties.
/// Dedicated flags win over `--conf`.
fn store_properties(args: &StoreArgs) -> CliResult<HashMap<String, String>> {
    let mut props = HashMap::new();
    for spec in &args.conf {
        let (key, value) = spec
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .context(InvalidConfSnafu { spec: spec.as_str() })?;
        props.insert(key.trim().to_string(), value.to_string());
    }

    let flags = [
        (ENDPOINT_KEY, args.endpoint.clone()),
        (REGION_KEY, args.region.clone()),
        (ACCESS_KEY_KEY, args.access_key.clone()),
        (SECRET_KEY_KEY, args.secret_key.clone()),
        (SESSION_TOKEN_KEY, args.session_token.clone()),
    ];
    for (key, value) in flags {
        if let Some(value) = value {
            props.insert(key.to_string(), value);
        }
    }
    if args.no_path_style {
        props.insert(PATH_STYLE_ACCESS_KEY.to_string(), "false".to_string());
    }
    Ok(props)
}

fn store_config(args: &StoreArgs) -> CliResult<StoreConfig> {
    StoreConfig::from_properties(&store_properties(args)?).context(ConfigSnafu)
}

async fn connect(args: &StoreArgs, root: &str) -> CliResult<S3CheckpointFileManager> {
    let config = store_config(args)?;
    debug!("connecting to {} for {root}", config.endpoint);
    S3CheckpointFileManager::connect(root, &config)
        .await
        .context(ConnectSnafu {
            endpoint: config.endpoint.as_str(),
        })
}

async fn read_input(file: Option<PathBuf>) -> CliResult<Vec<u8>> {
    match file {
        Some(file) => tokio::fs::read(&file).await.context(ReadInputSnafu {
            path: file.display().to_string(),
        }),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context(ReadInputSnafu { path: "<stdin>" })?;
            Ok(buf)
        }
    }
}

fn write_stdout(data: &[u8]) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(data).context(WriteOutputSnafu)?;
    stdout.flush().context(WriteOutputSnafu)
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Ls { path } => {
            let manager = connect(&cli.store, &path).await?;
            let statuses = manager
                .list(&path, &AcceptAll)
                .await
                .context(CheckpointSnafu {
                    command: "ls",
                    path: path.as_str(),
                })?;
            let mut out = String::new();
            for status in &statuses {
                out.push_str(&format!(
                    "{:>12}  {:>14}  {}\n",
                    status.size,
                    status.last_modified_millis,
                    status.path()
                ));
            }
            write_stdout(out.as_bytes())
        }

        Command::Put { path, file } => {
            let manager = connect(&cli.store, &path).await?;
            let ctx = CheckpointSnafu {
                command: "put",
                path: path.as_str(),
            };
            let mut stream = manager.create_atomic(&path, true).context(ctx)?;
            let data = match read_input(file).await {
                Ok(data) => data,
                Err(err) => {
                    stream.cancel().context(ctx)?;
                    return Err(err);
                }
            };
            stream.write(&data).context(ctx)?;
            stream.close().await.context(ctx)?;
            eprintln!("Committed {} bytes to {path}", data.len());
            Ok(())
        }

        Command::Cat { path } => {
            let manager = connect(&cli.store, &path).await?;
            let input = manager.open(&path).await.context(CheckpointSnafu {
                command: "cat",
                path: path.as_str(),
            })?;
            write_stdout(input.bytes())
        }

        Command::Exists { path } => {
            let manager = connect(&cli.store, &path).await?;
            let exists = manager.exists(&path).await.context(CheckpointSnafu {
                command: "exists",
                path: path.as_str(),
            })?;
            println!("{exists}");
            Ok(())
        }

        Command::Rm { path } => {
            let manager = connect(&cli.store, &path).await?;
            manager.delete(&path).await.context(CheckpointSnafu {
                command: "rm",
                path: path.as_str(),
            })
        }

        Command::Mkdirs { path } => {
            let manager = connect(&cli.store, &path).await?;
            manager.mkdirs(&path).context(CheckpointSnafu {
                command: "mkdirs",
                path: path.as_str(),
            })
        }

        Command::Root { path } => {
            let manager = connect(&cli.store, &path).await?;
            println!("{}", manager.create_checkpoint_directory());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
