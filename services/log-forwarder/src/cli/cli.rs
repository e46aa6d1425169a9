// Local crates
use crate::helpers::load_config::Config;
use crate::runtime;

// External crates
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "log-forwarder",
    long_about = "log-forwarder runs a command inside a Docker container and ships every log \
                  line it produces to AWS CloudWatch Logs, in order, as it happens.",
    about = "Container log forwarder for AWS CloudWatch Logs",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        log-forwarder run --docker-image alpine:3.20 --bash-command 'date' \\
            --aws-cloudwatch-group /containers/demo --aws-cloudwatch-stream stdout
        log-forwarder fetch --aws-cloudwatch-group /containers/demo --aws-cloudwatch-stream stdout
        log-forwarder validate --config ./forwarder.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a container and forward its logs to CloudWatch
    Run(RunArgs),

    /// Print the events currently held by a CloudWatch log stream
    Fetch(FetchArgs),

    /// Validate a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Display version information
    Version,
}

/// Flags mirror the configuration file one-to-one; a flag given on the
/// command line overrides the file value.
#[derive(Args)]
struct RunArgs {
    /// Configuration file to seed settings from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Docker image to run (must be present locally)
    #[arg(long)]
    docker_image: Option<String>,

    /// Command executed inside the container via `/bin/sh -c`
    #[arg(long)]
    bash_command: Option<String>,

    /// Name for the created container
    #[arg(long)]
    docker_container_name: Option<String>,

    /// CloudWatch log group to ship into
    #[arg(long)]
    aws_cloudwatch_group: Option<String>,

    /// CloudWatch log stream to ship into
    #[arg(long)]
    aws_cloudwatch_stream: Option<String>,

    #[command(flatten)]
    aws: AwsArgs,
}

#[derive(Args)]
struct FetchArgs {
    /// Configuration file to seed settings from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CloudWatch log group to read from
    #[arg(long)]
    aws_cloudwatch_group: Option<String>,

    /// CloudWatch log stream to read from
    #[arg(long)]
    aws_cloudwatch_stream: Option<String>,

    #[command(flatten)]
    aws: AwsArgs,
}

/// AWS settings shared by every remote-touching command. Credentials left
/// unset here fall back to the environment, then the shared credentials
/// file.
#[derive(Args)]
struct AwsArgs {
    #[arg(long)]
    aws_access_key_id: Option<String>,

    #[arg(long)]
    aws_secret_access_key: Option<String>,

    #[arg(long)]
    aws_session_token: Option<String>,

    /// AWS region, defaults to AWS_REGION then us-east-1
    #[arg(long)]
    aws_region: Option<String>,

    /// Endpoint override, e.g. a LocalStack URL
    #[arg(long)]
    aws_endpoint: Option<String>,
}

impl AwsArgs {
    fn apply(self, config: &mut Config) {
        merge(&mut config.aws.access_key_id, self.aws_access_key_id);
        merge(&mut config.aws.secret_access_key, self.aws_secret_access_key);
        merge(&mut config.aws.session_token, self.aws_session_token);
        merge(&mut config.aws.region, self.aws_region);
        merge(&mut config.aws.endpoint, self.aws_endpoint);
    }
}

fn merge(slot: &mut Option<String>, flag: Option<String>) {
    if flag.is_some() {
        *slot = flag;
    }
}

fn base_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

impl RunArgs {
    fn into_config(self) -> Result<Config> {
        let mut config = base_config(self.config)?;
        if let Some(image) = self.docker_image {
            config.container.image = image;
        }
        if let Some(command) = self.bash_command {
            config.container.command = command;
        }
        merge(&mut config.container.name, self.docker_container_name);
        if let Some(group) = self.aws_cloudwatch_group {
            config.destination.group = group;
        }
        if let Some(stream) = self.aws_cloudwatch_stream {
            config.destination.stream = stream;
        }
        self.aws.apply(&mut config);
        Ok(config)
    }
}

impl FetchArgs {
    fn into_config(self) -> Result<Config> {
        let mut config = base_config(self.config)?;
        if let Some(group) = self.aws_cloudwatch_group {
            config.destination.group = group;
        }
        if let Some(stream) = self.aws_cloudwatch_stream {
            config.destination.stream = stream;
        }
        self.aws.apply(&mut config);
        Ok(config)
    }
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => runtime::runtime::run_forwarder(args.into_config()?).await?,
        Commands::Fetch(args) => runtime::runtime::run_fetch(args.into_config()?).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Validate configuration file
fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    cfg.validate()?;
    println!("Configuration valid:\n{:#?}", cfg);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("log-forwarder {}", env!("CARGO_PKG_VERSION"));
}
