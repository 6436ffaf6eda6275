use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::CodecError;
use crate::object::StateTrackedObject;

/// File stem of the manifest at the restore-point root.
pub const MANIFEST_STEM: &str = "RestorePointManifest";

/// Ordered list of every object captured into a restore point.
///
/// The order is a valid topological traversal of the object graph:
/// dependencies always precede dependents. The manifest is written last
/// during capture; its presence signals a complete, consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePointManifest {
    pub objects: Vec<StateTrackedObject>,
}

impl RestorePointManifest {
    pub fn info_path(root: &Path) -> PathBuf {
        root.join(MANIFEST_STEM).with_extension("info")
    }

    pub fn json_path(root: &Path) -> PathBuf {
        root.join(MANIFEST_STEM).with_extension("json")
    }

    pub fn write(&self, root: &Path, with_json: bool) -> Result<(), CodecError> {
        codec::write_binary(&Self::info_path(root), self)?;
        if with_json {
            codec::write_json(&Self::json_path(root), self)?;
        }
        Ok(())
    }

    pub fn read(root: &Path) -> Result<Self, CodecError> {
        codec::read_binary(&Self::info_path(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;
    use std::fs;

    #[test]
    fn manifest_round_trip_preserves_order() {
        let dir = std::env::temp_dir().join(format!("vksnap-manifest-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");

        let manifest = RestorePointManifest {
            objects: vec![
                StateTrackedObject::new(ObjectType::Instance, 1, 1),
                StateTrackedObject::new(ObjectType::PhysicalDevice, 2, 1),
                StateTrackedObject::new(ObjectType::Device, 3, 3),
                StateTrackedObject::new(ObjectType::Buffer, 4, 3),
            ],
        };
        manifest.write(&dir, true).expect("write");

        let loaded = RestorePointManifest::read(&dir).expect("read");
        assert_eq!(loaded, manifest);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn absent_manifest_is_an_error() {
        let dir = std::env::temp_dir().join(format!("vksnap-no-manifest-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        assert!(RestorePointManifest::read(&dir).is_err());
        fs::remove_dir_all(dir).ok();
    }
}
