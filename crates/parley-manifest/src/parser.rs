use std::path::Path;

use crate::error::ManifestError;
use crate::model::Manifest;

/// Manifest versions this crate understands
pub const SUPPORTED_VERSION: &str = "1.0";

/// Parse a YAML string into a [`Manifest`].
///
/// Only the document shape and version are checked here. References between
/// flows are checked by the validation module.
pub fn parse_manifest(yaml_str: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_yaml::from_str(yaml_str)?;

    if manifest.manifest_version != SUPPORTED_VERSION {
        return Err(ManifestError::UnsupportedVersion(
            manifest.manifest_version.clone(),
        ));
    }

    Ok(manifest)
}

/// Read and parse a manifest file
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifest(&yaml)
}
