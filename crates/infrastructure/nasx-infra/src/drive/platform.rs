use nasx_core::NormalizedPath;

#[cfg(target_os = "windows")]
pub const DEFAULT_MOUNT_TEMPLATE: &str = r#"net use "$SHARE" /user:"$USER" "$PASSWORD""#;
#[cfg(target_os = "windows")]
pub const DEFAULT_UNMOUNT_TEMPLATE: &str = r#"net use "$SHARE" /delete"#;

#[cfg(not(target_os = "windows"))]
pub const DEFAULT_MOUNT_TEMPLATE: &str =
    "mount -t cifs $SHARE $TARGET -o username=$USER,password=$PASSWORD";
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_UNMOUNT_TEMPLATE: &str = "umount $TARGET";

/// The share in the spelling the platform's mount tool expects.
#[cfg(target_os = "windows")]
pub fn share_for_command(share: &NormalizedPath) -> String {
    share.as_str().to_string()
}

/// The share in the spelling the platform's mount tool expects.
#[cfg(not(target_os = "windows"))]
pub fn share_for_command(share: &NormalizedPath) -> String {
    if share.is_unc() {
        // mount.cifs wants `//host/share`
        share.as_str().replace('\\', "/")
    } else {
        share.as_str().to_string()
    }
}

#[cfg(target_os = "windows")]
pub fn split_command(cmd: &str) -> Option<Vec<String>> {
    // POSIX shlex treats `\` as an escape and would turn `\\host\share` into `\hostshare`.
    // Windows templates only need double-quote grouping and whitespace splitting.
    let mut parts = Vec::<String>::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in cmd.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return None;
    }

    if !current.is_empty() {
        parts.push(current);
    }

    Some(parts)
}

#[cfg(not(target_os = "windows"))]
pub fn split_command(cmd: &str) -> Option<Vec<String>> {
    shlex::split(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasx_core::NasPath;

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn unc_share_is_passed_with_forward_slashes() {
        let share = NasPath::normalize(r"\\nas01\finance").unwrap();
        assert_eq!(share_for_command(&share), "//nas01/finance");
    }

    #[test]
    #[cfg(target_os = "windows")]
    fn unc_share_is_passed_verbatim() {
        let share = NasPath::normalize("//nas01/finance").unwrap();
        assert_eq!(share_for_command(&share), r"\\nas01\finance");
    }

    #[test]
    fn unbalanced_quotes_do_not_split() {
        assert!(split_command(r#"mount "unterminated"#).is_none());
    }
}
