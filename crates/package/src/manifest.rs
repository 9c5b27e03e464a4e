//! Manifest Reader: parses and validates the package's declarative
//! manifest describing its three surfaces and entrypoints.

use crate::error::{Error, Result};
use agentrt_core::model::PackageManifest;
use std::path::Path;
use tracing::warn;

pub const MANIFEST_FILE_NAME: &str = "agent.manifest.toml";

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "version",
    "entrypoint",
    "rest",
    "rpc",
    "ui",
    "dependency_manifest",
];
const KNOWN_REST_KEYS: &[&str] = &["entry"];
const KNOWN_RPC_KEYS: &[&str] = &["service"];
const KNOWN_UI_KEYS: &[&str] = &["path", "base_path"];

/// Reads and validates the manifest at `package_root`/`agent.manifest.toml`.
///
/// Checks, in order: the file parses as valid TOML shaped like
/// [`PackageManifest`]; unknown top-level or surface keys are warned about,
/// not rejected; at least one surface must be declared; and every file a
/// declared surface references must exist in the extracted tree.
pub async fn read_manifest(package_root: &Path) -> Result<PackageManifest> {
    let manifest_path = package_root.join(MANIFEST_FILE_NAME);
    let contents = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| {
            Error::ManifestInvalid(format!(
                "could not read {}: {e}",
                manifest_path.display()
            ))
        })?;

    warn_on_unknown_keys(&contents);

    let manifest: PackageManifest = toml::from_str(&contents)
        .map_err(|e| Error::ManifestInvalid(format!("malformed manifest: {e}")))?;

    if manifest.name.trim().is_empty() {
        return Err(Error::ManifestInvalid("`name` must be non-empty".into()));
    }
    if manifest.version.trim().is_empty() {
        return Err(Error::ManifestInvalid("`version` must be non-empty".into()));
    }
    if !manifest.has_any_surface() {
        return Err(Error::ManifestInvalid(
            "at least one of rest.entry, rpc.service, ui.path must be declared".into(),
        ));
    }

    validate_referenced_files(package_root, &manifest).await?;

    Ok(manifest)
}

async fn validate_referenced_files(root: &Path, manifest: &PackageManifest) -> Result<()> {
    let mut referenced = Vec::new();
    if let Some(entry) = &manifest.entrypoint {
        referenced.push(("entrypoint", entry.clone()));
    }
    if let Some(entry) = &manifest.rest.entry {
        referenced.push(("rest.entry", entry.clone()));
    }
    if let Some(path) = &manifest.ui.path {
        referenced.push(("ui.path", path.clone()));
    }
    // rpc.service names a service identifier, not necessarily a file path,
    // so it is not checked for existence.

    for (field, rel_path) in referenced {
        let candidate = root.join(&rel_path);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Err(Error::ManifestInvalid(format!(
                "`{field}` references `{rel_path}`, which does not exist under the extracted package"
            )));
        }
    }

    Ok(())
}

/// Parses the manifest loosely as a generic TOML table and warns about any
/// top-level or surface-table key this reader doesn't recognise, without
/// failing the read.
fn warn_on_unknown_keys(contents: &str) {
    let Ok(toml::Value::Table(table)) = contents.parse::<toml::Value>() else {
        return;
    };

    for key in table.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            warn!(%key, "unknown top-level manifest key");
        }
    }

    warn_unknown_subtable(&table, "rest", KNOWN_REST_KEYS);
    warn_unknown_subtable(&table, "rpc", KNOWN_RPC_KEYS);
    warn_unknown_subtable(&table, "ui", KNOWN_UI_KEYS);
}

fn warn_unknown_subtable(table: &toml::value::Table, name: &str, known: &[&str]) {
    if let Some(toml::Value::Table(sub)) = table.get(name) {
        for key in sub.keys() {
            if !known.contains(&key.as_str()) {
                warn!(surface = name, %key, "unknown manifest surface key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_manifest(dir: &Path, contents: &str) {
        let mut f = tokio::fs::File::create(dir.join(MANIFEST_FILE_NAME)).await.unwrap();
        f.write_all(contents.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_manifest_with_no_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "name = \"a\"\nversion = \"1.0.0\"\n").await;
        let err = read_manifest(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid(_)));
    }

    #[tokio::test]
    async fn rejects_missing_referenced_file() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "name = \"a\"\nversion = \"1.0.0\"\n[rest]\nentry = \"server.py\"\n",
        )
        .await;
        let err = read_manifest(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid(_)));
    }

    #[tokio::test]
    async fn accepts_minimal_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("server.py"), b"# entry").await.unwrap();
        write_manifest(
            dir.path(),
            "name = \"a\"\nversion = \"1.0.0\"\n[rest]\nentry = \"server.py\"\n",
        )
        .await;
        let manifest = read_manifest(dir.path()).await.unwrap();
        assert_eq!(manifest.name, "a");
        assert!(manifest.declared_surfaces().rest);
        assert!(!manifest.declared_surfaces().rpc);
    }
}
