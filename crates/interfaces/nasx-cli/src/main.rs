use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use nasx_cli::commands;
use nasx_core::{Credentials, ShareMap, ShareMount};
use nasx_infra::drive::platform;
use nasx_infra::CommandMounter;
use nasx_pipeline::ExportPipeline;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "nasx", author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Base URL of the archive service.
    #[arg(long, env = "NASX_SERVER", default_value = nasx_config::DEFAULT_SERVER_URL, global = true)]
    server: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the service is up
    Health,
    /// List spreadsheets under a share path
    List {
        nas_path: String,
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Download all spreadsheets under a share path as one zip
    Download {
        nas_path: String,
        #[arg(short, long, default_value = ".")]
        output: Utf8PathBuf,
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Send a raw body to the server's parser and show what it understood
    #[command(name = "test-json")]
    TestJson { body: String },
    /// Show how the server normalizes and resolves a path
    #[command(name = "test-path")]
    TestPath { nas_path: String },
    /// Copy every file under a share path to a local directory
    Copy {
        nas_path: String,
        #[arg(short, long, default_value = ".")]
        target: Utf8PathBuf,
        #[arg(short, long, env = nasx_config::USERNAME_ENV)]
        username: Option<String>,
        #[arg(short, long, env = nasx_config::PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
        /// Map a share to a local mount point, e.g. `\\nas01\finance=/mnt/finance`
        #[arg(long = "share", value_delimiter = ',')]
        shares: Vec<ShareMount>,
        #[arg(long)]
        mount_template: Option<String>,
        #[arg(long)]
        unmount_template: Option<String>,
        #[arg(long, default_value_t = nasx_config::DEFAULT_MOUNT_TIMEOUT_SECS)]
        mount_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Health => {
            let client = commands::connect(&cli.server)?;
            commands::cmd_health(&client).await?;
        }
        Commands::List {
            nas_path,
            username,
            password,
        } => {
            let client = commands::connect(&cli.server)?;
            let creds = Credentials::from_parts(username, password);
            commands::cmd_list(&client, &nas_path, creds.as_ref()).await?;
        }
        Commands::Download {
            nas_path,
            output,
            username,
            password,
        } => {
            let client = commands::connect(&cli.server)?;
            let creds = Credentials::from_parts(username, password);
            commands::cmd_download(&client, &nas_path, creds.as_ref(), &output).await?;
        }
        Commands::TestJson { body } => {
            let client = commands::connect(&cli.server)?;
            commands::cmd_test_json(&client, body).await?;
        }
        Commands::TestPath { nas_path } => {
            let client = commands::connect(&cli.server)?;
            commands::cmd_test_path(&client, &nas_path).await?;
        }
        Commands::Copy {
            nas_path,
            target,
            username,
            password,
            shares,
            mount_template,
            unmount_template,
            mount_timeout_secs,
        } => {
            let timeout =
                Duration::from_secs(nasx_config::clamp_mount_timeout(mount_timeout_secs));
            let mounter = CommandMounter::new(
                mount_template.unwrap_or_else(|| platform::DEFAULT_MOUNT_TEMPLATE.to_string()),
                unmount_template
                    .unwrap_or_else(|| platform::DEFAULT_UNMOUNT_TEMPLATE.to_string()),
                timeout,
            );
            let pipeline =
                ExportPipeline::new(ShareMap::new(shares)).with_mounter(Arc::new(mounter));
            let creds = Credentials::from_parts(username, password);
            commands::cmd_copy(&pipeline, &nas_path, &target, creds).await?;
        }
    }

    Ok(())
}
