use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use nasx_core::{Credentials, NormalizedPath};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod platform;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("Mount template error: {0}")]
    Template(String),
    #[error("Failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to map network drive {share} (exit code {code:?}): {stderr}")]
    Failed {
        share: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Mapping network drive {share} timed out after {timeout:?}")]
    Timeout { share: String, timeout: Duration },
}

/// An OS-level mount held for the duration of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSession {
    share: String,
    target: Option<Utf8PathBuf>,
    mounted: bool,
}

impl DriveSession {
    /// A session that owns nothing; releasing it is a no-op.
    pub fn unmounted(share: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            target: None,
            mounted: false,
        }
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub fn target(&self) -> Option<&Utf8Path> {
        self.target.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

/// Mounts and unmounts remote shares.
///
/// `release` is best effort: failures are logged and swallowed so it can run
/// on every exit path.
#[async_trait]
pub trait DriveMounter: Send + Sync {
    async fn acquire(
        &self,
        share: &NormalizedPath,
        target: Option<&Utf8Path>,
        credentials: &Credentials,
    ) -> Result<DriveSession, MountError>;

    async fn release(&self, session: DriveSession);
}

/// Mounter for shares that are already reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMounter;

#[async_trait]
impl DriveMounter for NoopMounter {
    async fn acquire(
        &self,
        share: &NormalizedPath,
        _target: Option<&Utf8Path>,
        _credentials: &Credentials,
    ) -> Result<DriveSession, MountError> {
        Ok(DriveSession::unmounted(share.as_str()))
    }

    async fn release(&self, _session: DriveSession) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    secret: Option<String>,
}

impl ResolvedCommand {
    /// Arguments with the password masked, for logs.
    pub fn redacted(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            match &self.secret {
                Some(secret) if !secret.is_empty() => out.push_str(&arg.replace(secret, "***")),
                _ => out.push_str(arg),
            }
        }
        out
    }
}

struct TemplateVars<'a> {
    share: &'a str,
    target: Option<&'a str>,
    user: &'a str,
    password: &'a str,
}

const PLACEHOLDERS: [&str; 4] = ["$SHARE", "$TARGET", "$USER", "$PASSWORD"];

impl TemplateVars<'_> {
    fn value(&self, placeholder: &str) -> Result<&str, MountError> {
        match placeholder {
            "$SHARE" => Ok(self.share),
            "$TARGET" => self.target.ok_or_else(|| {
                MountError::Template(format!(
                    "template uses $TARGET but no mount point is configured for {}",
                    self.share
                ))
            }),
            "$USER" => Ok(self.user),
            "$PASSWORD" => Ok(self.password),
            other => Err(MountError::Template(format!("unknown placeholder {other}"))),
        }
    }
}

fn substitute(part: &str, vars: &TemplateVars<'_>) -> Result<String, MountError> {
    // Single left-to-right pass so values that contain `$NAME` are not expanded again.
    let mut out = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        match PLACEHOLDERS.iter().find(|p| tail.starts_with(**p)) {
            Some(p) => {
                out.push_str(vars.value(p)?);
                rest = &tail[p.len()..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve_command(template: &str, vars: &TemplateVars<'_>) -> Result<ResolvedCommand, MountError> {
    // Split before substituting so credentials or share names with spaces or
    // quotes always stay a single argument.
    let parts = platform::split_command(template)
        .ok_or_else(|| MountError::Template(format!("unbalanced quotes in `{template}`")))?;
    let mut parts = parts
        .iter()
        .map(|p| substitute(p, vars))
        .collect::<Result<Vec<_>, _>>()?;

    if parts.is_empty() {
        return Err(MountError::Template(
            "Mount template produced empty command".into(),
        ));
    }

    let program = parts.remove(0);
    Ok(ResolvedCommand {
        program,
        args: parts,
        secret: Some(vars.password.to_string()),
    })
}

/// Runs the platform mount tool (or a configured replacement) without a shell.
///
/// Templates may use `$SHARE`, `$TARGET`, `$USER` and `$PASSWORD`. The
/// credentials end up on the child's command line, so anyone able to list
/// processes on this host can read them while the mount runs.
#[derive(Debug, Clone)]
pub struct CommandMounter {
    mount_template: String,
    unmount_template: String,
    timeout: Duration,
}

impl CommandMounter {
    pub fn new(mount_template: String, unmount_template: String, timeout: Duration) -> Self {
        Self {
            mount_template,
            unmount_template,
            timeout,
        }
    }

    async fn run(&self, cmd: &ResolvedCommand, share: &str) -> Result<(), MountError> {
        debug!("Running {}", cmd.redacted());

        let child = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MountError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|source| MountError::Spawn {
                program: cmd.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(MountError::Timeout {
                    share: share.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(MountError::Failed {
                share: share.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl DriveMounter for CommandMounter {
    async fn acquire(
        &self,
        share: &NormalizedPath,
        target: Option<&Utf8Path>,
        credentials: &Credentials,
    ) -> Result<DriveSession, MountError> {
        let share_arg = platform::share_for_command(share);
        let vars = TemplateVars {
            share: &share_arg,
            target: target.map(Utf8Path::as_str),
            user: &credentials.username,
            password: &credentials.password,
        };
        let cmd = resolve_command(&self.mount_template, &vars)?;

        self.run(&cmd, &share_arg).await?;
        info!("Successfully mapped network drive: {}", share_arg);

        Ok(DriveSession {
            share: share_arg,
            target: target.map(Utf8Path::to_path_buf),
            mounted: true,
        })
    }

    async fn release(&self, session: DriveSession) {
        if !session.mounted {
            return;
        }
        let vars = TemplateVars {
            share: &session.share,
            target: session.target.as_deref().map(Utf8Path::as_str),
            user: "",
            password: "",
        };
        let result = match resolve_command(&self.unmount_template, &vars) {
            Ok(cmd) => self.run(&cmd, &session.share).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!("Unmapped network drive: {}", session.share),
            Err(e) => warn!("Error unmapping network drive {}: {}", session.share, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasx_core::NasPath;

    fn vars<'a>(target: Option<&'a str>) -> TemplateVars<'a> {
        TemplateVars {
            share: "//nas01/finance",
            target,
            user: "svc user",
            password: "p@ss $USER word",
        }
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn credentials_with_spaces_stay_single_arguments() {
        let cmd = resolve_command(
            "mount -t cifs $SHARE $TARGET -o username=$USER,password=$PASSWORD",
            &vars(Some("/mnt/finance")),
        )
        .unwrap();
        assert_eq!(cmd.program, "mount");
        assert_eq!(
            cmd.args,
            vec![
                "-t",
                "cifs",
                "//nas01/finance",
                "/mnt/finance",
                "-o",
                "username=svc user,password=p@ss $USER word",
            ]
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let out = substitute("$PASSWORD-$USER", &vars(None)).unwrap();
        assert_eq!(out, "p@ss $USER word-svc user");
    }

    #[test]
    fn unknown_dollar_sequences_pass_through() {
        assert_eq!(substitute("$HOME/$SHARE", &vars(None)).unwrap(), "$HOME///nas01/finance");
    }

    #[test]
    fn missing_target_is_a_template_error() {
        let err = resolve_command("umount $TARGET", &vars(None)).unwrap_err();
        assert!(matches!(err, MountError::Template(msg) if msg.contains("$TARGET")));
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(matches!(
            resolve_command("   ", &vars(None)),
            Err(MountError::Template(_))
        ));
    }

    #[test]
    fn redacted_command_masks_password() {
        let cmd = resolve_command("tool --pw=$PASSWORD $USER", &vars(None)).unwrap();
        let shown = cmd.redacted();
        assert!(!shown.contains("p@ss"));
        assert!(shown.contains("--pw=***"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn successful_command_yields_mounted_session() {
        let mounter = CommandMounter::new("true $SHARE".into(), "true".into(), Duration::from_secs(5));
        let share = NasPath::normalize(r"\\nas01\finance").unwrap();
        let creds = Credentials::new("u", "p");
        let session = mounter.acquire(&share, None, &creds).await.unwrap();
        assert!(session.is_mounted());
        assert_eq!(session.share(), "//nas01/finance");
        mounter.release(session).await;
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn failing_command_reports_exit_code() {
        let mounter = CommandMounter::new("false".into(), "true".into(), Duration::from_secs(5));
        let share = NasPath::normalize(r"\\nas01\finance").unwrap();
        let err = mounter
            .acquire(&share, None, &Credentials::new("u", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn hung_mount_times_out() {
        let mounter = CommandMounter::new("sleep 10".into(), "true".into(), Duration::from_millis(200));
        let share = NasPath::normalize(r"\\nas01\finance").unwrap();
        let err = mounter
            .acquire(&share, None, &Credentials::new("u", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let mounter = CommandMounter::new(
            "nasx-definitely-not-installed".into(),
            "true".into(),
            Duration::from_secs(5),
        );
        let share = NasPath::normalize(r"\\nas01\finance").unwrap();
        let err = mounter
            .acquire(&share, None, &Credentials::new("u", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Spawn { .. }));
    }
}
