use s3_checkpoint_core::{CheckpointError, ConfigError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --conf '{spec}': expected KEY=VALUE"))]
    InvalidConf { spec: String },

    #[snafu(display("Invalid store configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display(
        "Failed to connect to {endpoint}. \
         Check the endpoint and credentials: {source}"
    ))]
    Connect {
        endpoint: String,
        #[snafu(source(from(CheckpointError, Box::new)))]
        source: Box<CheckpointError>,
    },

    #[snafu(display("{command} failed for {path}: {source}"))]
    Checkpoint {
        command: &'static str,
        path: String,
        #[snafu(source(from(CheckpointError, Box::new)))]
        source: Box<CheckpointError>,
    },

    #[snafu(display("Failed to read input from {path}"))]
    ReadInput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write to stdout"))]
    WriteOutput { source: std::io::Error },
}
