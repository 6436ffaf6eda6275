use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error};

use vksnap_object::object::ObjectType;
use vksnap_object::VisitHandles;

use crate::error::{SnapError, SnapResult};

/// Observer invoked for every registered mapping pair, letting an external
/// party mirror the map (used by repeating-mode apply to update layer-side
/// bookkeeping).
pub type ProcessObjectFn = dyn Fn(ObjectType, u64, u64) + Send + Sync;

/// Bidirectional mapping between captured object handles and the handles
/// created for them during one apply pass.
///
/// The map is a bijection restricted to the objects instantiated in this
/// pass: every captured handle may be registered exactly once, and the null
/// handle is never tracked (lookups of 0 return 0 without consulting the
/// map).
pub struct HandleMap {
    /// Captured handle -> restored handle
    restored: DashMap<u64, u64>,
    /// Restored handle -> captured handle
    captured: DashMap<u64, u64>,
    process_object: Option<Box<ProcessObjectFn>>,
}

impl HandleMap {
    pub fn new() -> Self {
        Self {
            restored: DashMap::new(),
            captured: DashMap::new(),
            process_object: None,
        }
    }

    /// Install the mapping observer. Replaces any previous observer.
    pub fn set_process_object_callback(
        &mut self,
        callback: Box<ProcessObjectFn>,
    ) {
        self.process_object = Some(callback);
    }

    /// Register a captured→restored pair in both directions.
    ///
    /// Errors if either handle is null or either direction already holds a
    /// mapping for its key.
    pub fn register(
        &self,
        object_type: ObjectType,
        captured: u64,
        restored: u64,
    ) -> SnapResult<()> {
        if captured == 0 || restored == 0 {
            return Err(SnapError::MalformedInfo(format!(
                "null handle in mapping registration for {object_type:?}"
            )));
        }

        match self.restored.entry(captured) {
            Entry::Occupied(existing) => {
                return Err(SnapError::DuplicateHandle {
                    captured,
                    restored: *existing.get(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(restored);
            }
        }
        match self.captured.entry(restored) {
            Entry::Occupied(existing) => {
                // Roll back the forward insertion so the map stays a bijection.
                self.restored.remove(&captured);
                return Err(SnapError::DuplicateHandle {
                    captured: *existing.get(),
                    restored,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(captured);
            }
        }

        debug!(
            ?object_type,
            captured = format_args!("{captured:#x}"),
            restored = format_args!("{restored:#x}"),
            "registered handle mapping"
        );
        if let Some(callback) = &self.process_object {
            callback(object_type, captured, restored);
        }
        Ok(())
    }

    /// Look up the restored handle for a captured one. Null maps to null.
    pub fn get_restored(&self, captured: u64) -> SnapResult<u64> {
        if captured == 0 {
            return Ok(0);
        }
        self.restored
            .get(&captured)
            .map(|v| *v)
            .ok_or(SnapError::MissingHandle(captured))
    }

    /// Look up the captured handle for a restored one. Null maps to null.
    pub fn get_captured(&self, restored: u64) -> SnapResult<u64> {
        if restored == 0 {
            return Ok(0);
        }
        self.captured
            .get(&restored)
            .map(|v| *v)
            .ok_or(SnapError::MissingHandle(restored))
    }

    /// Whether a captured handle has a registered counterpart.
    pub fn contains_captured(&self, captured: u64) -> bool {
        self.restored.contains_key(&captured)
    }

    pub fn len(&self) -> usize {
        self.restored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restored.is_empty()
    }

    /// Rewrite every non-null handle field of a captured structure in place
    /// with its restored counterpart. Fails on the first handle with no
    /// registered mapping.
    pub fn update_handles(&self, structure: &mut dyn VisitHandles) -> SnapResult<()> {
        self.update_handles_inner(structure, false)
    }

    /// [`update_handles`](Self::update_handles) variant for command-buffer
    /// replay: a captured framebuffer may legitimately have no restored
    /// counterpart yet (lazily created), in which case the reference is
    /// rewritten to null instead of failing.
    pub fn update_cmd_handles(&self, structure: &mut dyn VisitHandles) -> SnapResult<()> {
        self.update_handles_inner(structure, true)
    }

    fn update_handles_inner(
        &self,
        structure: &mut dyn VisitHandles,
        tolerate_missing_framebuffer: bool,
    ) -> SnapResult<()> {
        let mut failure: Option<SnapError> = None;
        structure.visit_handles(&mut |object_type, handle| {
            if *handle == 0 || failure.is_some() {
                return;
            }
            match self.get_restored(*handle) {
                Ok(restored) => *handle = restored,
                Err(_) if tolerate_missing_framebuffer
                    && object_type == ObjectType::Framebuffer =>
                {
                    debug!(
                        captured = format_args!("{:#x}", *handle),
                        "framebuffer not yet restored, rewriting to null"
                    );
                    *handle = 0;
                }
                Err(err) => {
                    error!(
                        ?object_type,
                        captured = format_args!("{:#x}", *handle),
                        "missing handle mapping"
                    );
                    failure = Some(err);
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for HandleMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use vksnap_object::create_info::SerializedFramebufferCreateInfo;

    #[test]
    fn bijection_round_trip() {
        let map = HandleMap::new();
        map.register(ObjectType::Buffer, 0x10, 0x99).expect("register");

        let restored = map.get_restored(0x10).expect("restored");
        let captured = map.get_captured(restored).expect("captured");
        assert_eq!(captured, 0x10);
        assert_eq!(map.get_restored(captured).expect("again"), restored);
    }

    #[test]
    fn null_propagates_without_registration() {
        let map = HandleMap::new();
        assert_eq!(map.get_restored(0).expect("null"), 0);
        assert_eq!(map.get_captured(0).expect("null"), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let map = HandleMap::new();
        map.register(ObjectType::Image, 1, 2).expect("first");
        assert!(matches!(
            map.register(ObjectType::Image, 1, 3),
            Err(SnapError::DuplicateHandle { captured: 1, restored: 2 })
        ));
        // Reverse-direction collision rolls back, leaving the map intact.
        assert!(map.register(ObjectType::Image, 4, 2).is_err());
        assert!(!map.contains_captured(4));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn missing_lookup_fails() {
        let map = HandleMap::new();
        assert!(matches!(
            map.get_restored(42),
            Err(SnapError::MissingHandle(42))
        ));
    }

    #[test]
    fn observer_sees_every_registration() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut map = HandleMap::new();
        map.set_process_object_callback(Box::new(move |ty, captured, restored| {
            assert_eq!(ty, ObjectType::Fence);
            assert_eq!(captured + 1, restored);
            seen.fetch_add(1, Ordering::Relaxed);
        }));
        map.register(ObjectType::Fence, 1, 2).expect("a");
        map.register(ObjectType::Fence, 3, 4).expect("b");
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn update_handles_rewrites_in_place_and_fails_on_gap() {
        let map = HandleMap::new();
        map.register(ObjectType::RenderPass, 10, 110).expect("rp");
        map.register(ObjectType::ImageView, 20, 120).expect("view");

        let mut info = SerializedFramebufferCreateInfo {
            flags: 0,
            render_pass: 10,
            attachments: vec![20, 0],
            width: 1,
            height: 1,
            layers: 1,
        };
        map.update_handles(&mut info).expect("rewrite");
        assert_eq!(info.render_pass, 110);
        assert_eq!(info.attachments, vec![120, 0]);

        let mut broken = SerializedFramebufferCreateInfo {
            flags: 0,
            render_pass: 10,
            attachments: vec![30],
            width: 1,
            height: 1,
            layers: 1,
        };
        assert!(map.update_handles(&mut broken).is_err());
    }

    #[test]
    fn cmd_rewrite_tolerates_missing_framebuffer_only() {
        use vksnap_object::commands::RecordedCommand;
        use vksnap_object::create_info::{
            SerializedExtent2D, SerializedOffset2D, SerializedRect2D,
        };

        let map = HandleMap::new();
        map.register(ObjectType::RenderPass, 10, 110).expect("rp");

        let mut begin = RecordedCommand::BeginRenderPass {
            render_pass: 10,
            framebuffer: 55,
            render_area: SerializedRect2D {
                offset: SerializedOffset2D { x: 0, y: 0 },
                extent: SerializedExtent2D { width: 4, height: 4 },
            },
            clear_values: vec![],
            contents: 0,
        };
        map.update_cmd_handles(&mut begin).expect("tolerant rewrite");
        match begin {
            RecordedCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                ..
            } => {
                assert_eq!(render_pass, 110);
                assert_eq!(framebuffer, 0);
            }
            _ => unreachable!(),
        }

        // Other types still fail hard.
        let mut bind = RecordedCommand::BindPipeline {
            pipeline_bind_point: 0,
            pipeline: 77,
        };
        assert!(map.update_cmd_handles(&mut bind).is_err());
    }
}
