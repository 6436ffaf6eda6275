//! Restore-point creator: walks the live object graph through the state
//! tracker and persists every object's restore info, downloading
//! GPU-resident data through the copy engine concurrently with the walk.
//! The manifest is written last; its presence signals a complete snapshot.

pub mod creator;

pub use creator::Creator;
