//! Checkpoint records for named parameter groups
//!
//! A checkpoint root holds incrementally numbered record directories
//! (`ckpt-1`, `ckpt-2`, ...), each containing one safetensors file per
//! parameter group. The latest record is resolved by directory scan, and
//! restoration can target the full set of registered groups or a named
//! subset (the transfer-learning path loads only the decoder group).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tch::nn;

/// Group name for encoder parameters
pub const GROUP_ENCODER: &str = "encoder";

/// Group name for decoder parameters
pub const GROUP_DECODER: &str = "decoder";

const RECORD_PREFIX: &str = "ckpt-";

/// One on-disk checkpoint record
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    index: u64,
    path: PathBuf,
}

impl CheckpointRecord {
    /// Monotonically increasing record index within its root
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Record directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn group_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.safetensors"))
    }

    /// Whether this record contains the named parameter group
    pub fn has_group(&self, name: &str) -> bool {
        self.group_path(name).is_file()
    }

    /// Serialize one parameter group into this record
    pub fn save_group(&self, name: &str, vs: &nn::VarStore) -> Result<()> {
        let path = self.group_path(name);
        vs.save(&path)
            .with_context(|| format!("failed to save parameter group '{name}' to {}", path.display()))?;
        tracing::debug!("saved parameter group '{}' to {}", name, path.display());
        Ok(())
    }

    /// Restore one parameter group from this record into `vs`
    ///
    /// Fails when the group file is missing or when any variable's shape does
    /// not match the live store; the caller must treat that as fatal.
    pub fn load_group(&self, name: &str, vs: &mut nn::VarStore) -> Result<()> {
        let path = self.group_path(name);
        if !path.is_file() {
            anyhow::bail!(
                "checkpoint record {} has no parameter group '{name}'",
                self.path.display()
            );
        }
        vs.load(&path).with_context(|| {
            format!("failed to restore parameter group '{name}' from {}", path.display())
        })?;
        tracing::debug!("restored parameter group '{}' from {}", name, path.display());
        Ok(())
    }
}

/// Resolve the latest checkpoint record under `root` by directory scan
///
/// Returns `Ok(None)` when the root does not exist or holds no records.
pub fn latest(root: impl AsRef<Path>) -> Result<Option<CheckpointRecord>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<CheckpointRecord> = None;
    for entry in
        fs::read_dir(root).with_context(|| format!("failed to scan {}", root.display()))?
    {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix(RECORD_PREFIX))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        if newest.as_ref().map_or(true, |r| index > r.index) {
            newest = Some(CheckpointRecord { index, path: entry.path() });
        }
    }
    Ok(newest)
}

/// Create the next numbered checkpoint record under `root`
///
/// Previous records are left in place.
pub fn create(root: impl AsRef<Path>) -> Result<CheckpointRecord> {
    let root = root.as_ref();
    let index = latest(root)?.map_or(1, |r| r.index + 1);
    let path = root.join(format!("{RECORD_PREFIX}{index}"));
    fs::create_dir_all(&path)
        .with_context(|| format!("failed to create checkpoint record {}", path.display()))?;
    tracing::info!("created checkpoint record {}", path.display());
    Ok(CheckpointRecord { index, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    fn store_with_weight(init: f64) -> nn::VarStore {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().zeros("w", &[4, 3]);
        tch::no_grad(|| {
            let _ = w.shallow_clone().fill_(init);
        });
        vs
    }

    #[test]
    fn test_latest_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest(dir.path()).unwrap().is_none());
        assert!(latest(dir.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn test_record_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let first = create(dir.path()).unwrap();
        let second = create(dir.path()).unwrap();

        assert_eq!(first.index(), 1);
        assert_eq!(second.index(), 2);
        assert_eq!(latest(dir.path()).unwrap().unwrap().index(), 2);
        assert!(first.path().is_dir());
    }

    #[test]
    fn test_group_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let record = create(dir.path()).unwrap();

        let saved = store_with_weight(0.5);
        record.save_group(GROUP_DECODER, &saved).unwrap();
        assert!(record.has_group(GROUP_DECODER));
        assert!(!record.has_group(GROUP_ENCODER));

        let mut restored = store_with_weight(-1.0);
        record.load_group(GROUP_DECODER, &mut restored).unwrap();

        let w = &restored.variables()["w"];
        let diff: f64 = (w - Tensor::full([4, 3], 0.5, (Kind::Float, Device::Cpu)))
            .abs()
            .max()
            .try_into()
            .unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_missing_group_fails() {
        let dir = tempfile::tempdir().unwrap();
        let record = create(dir.path()).unwrap();

        let mut vs = store_with_weight(0.0);
        assert!(record.load_group(GROUP_ENCODER, &mut vs).is_err());
    }
}
