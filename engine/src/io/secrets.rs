//! Secret materialization: read secret files, write the environment bundle.
//!
//! Runs in the privileged half of the setup split. Fails closed: a missing,
//! empty, or group/world-readable secret aborts before any dependent step,
//! so a silently-empty token can never reach the subprocess.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::config::SecretsConfig;
use crate::io::paths::EnginePaths;

/// Environment variable names in the bundle.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const GIT_TOKEN_VAR: &str = "GIT_TOKEN";
pub const CONFIG_DIR_VAR: &str = "CLAUDE_CONFIG_DIR";

/// Write `state/engine.env` from scratch.
///
/// The bundle is regenerated wholesale on every run, never patched, and is
/// handed off mode 0600 for the worker identity to read.
#[instrument(skip_all)]
pub fn materialize_bundle(paths: &EnginePaths, secrets: &SecretsConfig) -> Result<()> {
    let api_key = read_secret(&secrets.api_key_file, "api_key_file")?;

    let mut lines = vec![
        format!("{API_KEY_VAR}={api_key}"),
        format!(
            "{CONFIG_DIR_VAR}={}",
            paths.assistant_config_dir.display()
        ),
    ];
    if let Some(token_file) = &secrets.git_token_file {
        let token = read_secret(token_file, "git_token_file")?;
        lines.push(format!("{GIT_TOKEN_VAR}={token}"));
    }
    let mut contents = lines.join("\n");
    contents.push('\n');

    write_private(&paths.bundle_path, contents.as_bytes())?;
    info!(bundle = %paths.bundle_path.display(), "environment bundle written");
    Ok(())
}

/// Atomic write with the 0600 mode applied before the rename, so the
/// bundle is never observable with looser permissions.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp bundle {}", tmp_path.display()))?;
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("chmod {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Parse the bundle into key/value pairs, verifying the required key.
///
/// The worker calls this before every drain: a bundle missing a non-empty
/// API key means setup never completed, and processing must not start.
pub fn load_bundle(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = fs::read_to_string(path).with_context(|| {
        format!(
            "read environment bundle {} (has setup run?)",
            path.display()
        )
    })?;
    let mut pairs = Vec::new();
    for line in contents.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed bundle line in {}", path.display()))?;
        pairs.push((key.to_string(), value.to_string()));
    }
    let api_key = pairs
        .iter()
        .find(|(key, _)| key == API_KEY_VAR)
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();
    if api_key.trim().is_empty() {
        return Err(anyhow!(
            "environment bundle {} has no usable {API_KEY_VAR}",
            path.display()
        ));
    }
    debug!(entries = pairs.len(), "environment bundle loaded");
    Ok(pairs)
}

/// Look up one bundle value.
pub fn bundle_value<'a>(bundle: &'a [(String, String)], key: &str) -> Option<&'a str> {
    bundle
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn read_secret(path: &Path, label: &str) -> Result<String> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("stat secret {label} at {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(anyhow!(
            "secret {label} at {} has insecure permissions {:o}; expected 0600 or stricter",
            path.display(),
            mode
        ));
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read secret {label} at {}", path.display()))?;
    let value = raw.trim_end();
    if value.is_empty() {
        return Err(anyhow!(
            "secret {label} at {} is empty after trimming",
            path.display()
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_secret(path: &Path, contents: &str, mode: u32) {
        fs::write(path, contents).expect("write secret");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    fn engine_paths(root: &Path) -> EnginePaths {
        let paths = EnginePaths::new(root);
        paths.ensure_layout().expect("layout");
        paths
    }

    #[test]
    fn bundle_carries_key_config_dir_and_token() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = engine_paths(temp.path());
        let api_key_file = temp.path().join("api-key");
        let token_file = temp.path().join("token");
        write_secret(&api_key_file, "sk-ant-test\n", 0o600);
        write_secret(&token_file, "ghp-test\n", 0o600);

        materialize_bundle(
            &paths,
            &SecretsConfig {
                api_key_file,
                git_token_file: Some(token_file),
            },
        )
        .expect("materialize");

        let bundle = load_bundle(&paths.bundle_path).expect("load");
        assert_eq!(bundle_value(&bundle, API_KEY_VAR), Some("sk-ant-test"));
        assert_eq!(bundle_value(&bundle, GIT_TOKEN_VAR), Some("ghp-test"));
        assert_eq!(
            bundle_value(&bundle, CONFIG_DIR_VAR),
            Some(paths.assistant_config_dir.to_str().expect("utf8"))
        );

        let mode = fs::metadata(&paths.bundle_path)
            .expect("stat")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn empty_after_trim_fails_closed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = engine_paths(temp.path());
        let api_key_file = temp.path().join("api-key");
        write_secret(&api_key_file, "  \n\n", 0o600);

        let err = materialize_bundle(
            &paths,
            &SecretsConfig {
                api_key_file,
                git_token_file: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty after trimming"));
        assert!(!paths.bundle_path.exists());
    }

    #[test]
    fn group_or_world_readable_secret_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = engine_paths(temp.path());
        let api_key_file = temp.path().join("api-key");
        let token_file = temp.path().join("token");
        write_secret(&api_key_file, "sk-ant-test\n", 0o600);
        write_secret(&token_file, "ghp-test\n", 0o644);

        let err = materialize_bundle(
            &paths,
            &SecretsConfig {
                api_key_file,
                git_token_file: Some(token_file),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));
        assert!(!paths.bundle_path.exists());
    }

    #[test]
    fn missing_secret_file_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = engine_paths(temp.path());
        let err = materialize_bundle(
            &paths,
            &SecretsConfig {
                api_key_file: temp.path().join("nope"),
                git_token_file: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("stat secret"));
    }

    #[test]
    fn bundle_without_api_key_refuses_to_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.env");
        fs::write(&path, format!("{API_KEY_VAR}=\nOTHER=x\n")).expect("write");
        let err = load_bundle(&path).unwrap_err();
        assert!(err.to_string().contains("no usable"));
    }

    #[test]
    fn preserves_trailing_whitespace_trim_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = engine_paths(temp.path());
        let api_key_file = temp.path().join("api-key");
        write_secret(&api_key_file, "  sk-with-lead\n", 0o600);

        materialize_bundle(
            &paths,
            &SecretsConfig {
                api_key_file,
                git_token_file: None,
            },
        )
        .expect("materialize");
        let bundle = load_bundle(&paths.bundle_path).expect("load");
        // Only trailing whitespace is stripped.
        assert_eq!(bundle_value(&bundle, API_KEY_VAR), Some("  sk-with-lead"));
    }
}
