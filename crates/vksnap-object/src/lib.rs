//! Serializable object model for Vulkan restore points.
//!
//! Everything persisted into a restore point lives here: object identities,
//! serialized create-info mirrors, per-object restore info, recorded command
//! buffer contents, the manifest, and the on-disk codec.

pub mod codec;
pub mod commands;
pub mod create_info;
pub mod error;
pub mod handles;
pub mod manifest;
pub mod object;
pub mod restore_info;

pub use error::CodecError;
pub use handles::VisitHandles;
pub use manifest::RestorePointManifest;
pub use object::{ObjectType, StateTrackedObject};
pub use restore_info::{RestoreInfo, TypedRestoreInfo};
