//! On-disk codec and path scheme for restore-point artifacts.
//!
//! Each object persists under `<root>/<VkTypeName>/<hex(handle)>.info`
//! (binary, always) with an optional `.json` mirror; device-memory payloads
//! live next to their info file with a `.bin` extension.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::object::{ObjectType, StateTrackedObject};
use crate::restore_info::RestoreInfo;

/// Maximum size of a single `.info` file: 256 MB.
/// Anything larger indicates corruption rather than a real capture.
pub const MAX_INFO_SIZE: u64 = 256 * 1024 * 1024;

pub fn object_dir(root: &Path, object_type: ObjectType) -> PathBuf {
    root.join(object_type.type_name())
}

fn object_stem(root: &Path, object: &StateTrackedObject) -> PathBuf {
    object_dir(root, object.object_type).join(format!("{:x}", object.handle))
}

pub fn info_path(root: &Path, object: &StateTrackedObject) -> PathBuf {
    object_stem(root, object).with_extension("info")
}

pub fn json_path(root: &Path, object: &StateTrackedObject) -> PathBuf {
    object_stem(root, object).with_extension("json")
}

pub fn bin_path(root: &Path, object: &StateTrackedObject) -> PathBuf {
    object_stem(root, object).with_extension("bin")
}

/// Serialize a value into a binary file, creating parent directories.
pub fn write_binary<T: Serialize>(path: &Path, value: &T) -> Result<(), CodecError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = bincode::serialize(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Read a binary file written by [`write_binary`].
pub fn read_binary<T: DeserializeOwned>(path: &Path) -> Result<T, CodecError> {
    let metadata = fs::metadata(path).map_err(|e| CodecError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.len() > MAX_INFO_SIZE {
        return Err(CodecError::Serialization(format!(
            "{}: file exceeds {} bytes",
            path.display(),
            MAX_INFO_SIZE
        )));
    }
    let bytes = fs::read(path).map_err(|e| CodecError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    bincode::deserialize(&bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Write the human-readable JSON mirror of a value.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CodecError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text =
        serde_json::to_string_pretty(value).map_err(|e| CodecError::Json(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

/// Persist one object's restore info: `.info` always, `.json` on request.
pub fn write_restore_info(
    root: &Path,
    info: &RestoreInfo,
    with_json: bool,
) -> Result<(), CodecError> {
    write_binary(&info_path(root, &info.object), info)?;
    if with_json {
        write_json(&json_path(root, &info.object), info)?;
    }
    Ok(())
}

/// Load one object's restore info from its `.info` file.
pub fn read_restore_info(
    root: &Path,
    object: &StateTrackedObject,
) -> Result<RestoreInfo, CodecError> {
    read_binary(&info_path(root, object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_info::SerializedFenceCreateInfo;
    use crate::restore_info::{FenceRestoreInfo, TypedRestoreInfo};
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let seq = TEST_DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vksnap-codec-test-{}-{}",
            std::process::id(),
            seq
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn restore_info_round_trips_through_info_file() {
        let root = scratch_dir();
        let object = StateTrackedObject::new(ObjectType::Fence, 0xdead, 0x10);
        let info = RestoreInfo {
            object,
            dependencies: vec![StateTrackedObject::new(ObjectType::Device, 0x10, 0x10)],
            info: TypedRestoreInfo::Fence(FenceRestoreInfo {
                create_info: SerializedFenceCreateInfo { flags: 1 },
                signaled: true,
            }),
        };

        write_restore_info(&root, &info, true).expect("write");
        let loaded = read_restore_info(&root, &object).expect("read");
        assert_eq!(loaded, info);

        // JSON mirror exists next to the binary and names the type dir
        let json = json_path(&root, &object);
        assert!(json.ends_with("VkFence/dead.json"), "{}", json.display());
        assert!(json.exists());

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_info_file_reports_path() {
        let root = scratch_dir();
        let object = StateTrackedObject::new(ObjectType::Buffer, 0x77, 0);
        let err = read_restore_info(&root, &object).expect_err("must fail");
        match err {
            CodecError::Unreadable { path, .. } => {
                assert!(path.ends_with("VkBuffer/77.info"));
            }
            other => panic!("expected Unreadable, got {other:?}"),
        }
        fs::remove_dir_all(root).ok();
    }
}
