use camino::Utf8PathBuf;
use clap::Parser;
use nasx_core::{Credentials, ShareMap, ShareMount};
use nasx_infra::drive::platform;
use nasx_infra::CommandMounter;
use nasx_pipeline::{ArchiveBuilder, ExportPipeline};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "nasx-server",
    author,
    version,
    about = "Collects spreadsheets from network shares and serves them as zip archives"
)]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "NASX_HOST", default_value = nasx_config::DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "NASX_PORT", default_value_t = nasx_config::DEFAULT_PORT)]
    pub port: u16,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    pub debug: bool,

    /// Map a share to a local mount point, e.g. `\\nas01\finance=/mnt/finance`.
    #[arg(long = "share", env = "NASX_SHARES", value_delimiter = ',')]
    pub shares: Vec<ShareMount>,

    /// Default share user when a request carries no credentials.
    #[arg(long, env = nasx_config::USERNAME_ENV)]
    pub username: Option<String>,

    #[arg(long, env = nasx_config::PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Mount command; `$SHARE`, `$TARGET`, `$USER` and `$PASSWORD` are substituted.
    #[arg(long)]
    pub mount_template: Option<String>,

    #[arg(long)]
    pub unmount_template: Option<String>,

    #[arg(long, default_value_t = nasx_config::DEFAULT_MOUNT_TIMEOUT_SECS)]
    pub mount_timeout_secs: u64,

    /// Where staging directories and archives are created. Defaults to the system temp dir.
    #[arg(long, env = "NASX_TEMP_DIR")]
    pub temp_dir: Option<Utf8PathBuf>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_secs(nasx_config::clamp_mount_timeout(self.mount_timeout_secs))
    }

    pub fn default_credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }

    pub fn mounter(&self) -> CommandMounter {
        CommandMounter::new(
            self.mount_template
                .clone()
                .unwrap_or_else(|| platform::DEFAULT_MOUNT_TEMPLATE.to_string()),
            self.unmount_template
                .clone()
                .unwrap_or_else(|| platform::DEFAULT_UNMOUNT_TEMPLATE.to_string()),
            self.mount_timeout(),
        )
    }

    pub fn pipeline(&self) -> ExportPipeline {
        let mut builder = ArchiveBuilder::new();
        if let Some(dir) = &self.temp_dir {
            builder = builder.with_temp_root(dir.clone());
        }
        ExportPipeline::new(ShareMap::new(self.shares.clone()))
            .with_mounter(Arc::new(self.mounter()))
            .with_archive_builder(builder)
            .with_default_credentials(self.default_credentials())
    }
}
