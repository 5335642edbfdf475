use std::collections::VecDeque;

use crate::image::Image;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// What kind of edit an undo step or group represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoKind {
    // groups
    ImageResize,
    ImageCrop,
    ImageQuickMask,
    LayerApplyMask,
    FsFloat,
    FsAnchor,
    FsToLayer,
    ItemProperties,
    EditCut,
    Misc,
    // single records
    ImageSize,
    LayerAdd,
    LayerRemove,
    ChannelAdd,
    ChannelRemove,
    MaskAdd,
    MaskRemove,
    MaskApply,
    MaskShow,
    LayerOpacity,
    LayerMode,
    LayerLockAlpha,
    ItemDisplace,
    ItemRename,
    ItemVisibility,
    DrawableBuffer,
    ImageGuides,
    ImageSamplePoints,
    Vectors,
}

/// A reversible edit. Records own whatever state they swap in and out, so
/// undo followed by redo restores the very same item instances.
pub trait Command: Send {
    fn undo(&mut self, image: &mut Image);
    fn redo(&mut self, image: &mut Image);
    fn description(&self) -> String;
    fn kind(&self) -> UndoKind;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// GROUP COMMAND: several records undone and redone as one step
// ============================================================================

pub struct GroupCommand {
    kind: UndoKind,
    description: String,
    commands: Vec<Box<dyn Command>>,
}

impl GroupCommand {
    pub fn new(kind: UndoKind, description: impl Into<String>) -> Self {
        Self { kind, description: description.into(), commands: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for GroupCommand {
    fn undo(&mut self, image: &mut Image) {
        for cmd in self.commands.iter_mut().rev() {
            cmd.undo(image);
        }
    }

    fn redo(&mut self, image: &mut Image) {
        for cmd in self.commands.iter_mut() {
            cmd.redo(image);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn kind(&self) -> UndoKind {
        self.kind
    }

    fn memory_size(&self) -> usize {
        self.commands.iter().map(|c| c.memory_size()).sum::<usize>() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// A committed step with the memory it was charged when it entered the
/// journal. Records swap state on undo and redo, so their live size drifts.
pub(crate) struct Step {
    pub(crate) command: Box<dyn Command>,
    size: usize,
}

/// Undo journal of one image.
pub struct HistoryManager {
    undo_stack: VecDeque<Step>,
    redo_stack: VecDeque<Step>,
    /// Groups currently open, innermost last.
    open_groups: Vec<GroupCommand>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    /// Set while a step is being undone or redone; pushes are dropped.
    replaying: bool,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("open_groups", &self.open_groups.len())
            .finish()
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            open_groups: Vec::new(),
            max_history_size,
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
            replaying: false,
        }
    }

    pub fn set_limits(&mut self, max_history_size: usize, max_memory_bytes: Option<usize>) {
        self.max_history_size = max_history_size;
        self.max_memory_bytes = max_memory_bytes;
        self.prune();
    }

    /// Record an edit, into the innermost open group if there is one.
    pub fn push(&mut self, command: Box<dyn Command>) {
        if self.replaying {
            return;
        }
        log::debug!("undo: push {:?} \"{}\"", command.kind(), command.description());
        match self.open_groups.last_mut() {
            Some(group) => group.commands.push(command),
            None => self.commit(command),
        }
    }

    pub fn begin_group(&mut self, kind: UndoKind, description: impl Into<String>) {
        if self.replaying {
            return;
        }
        self.open_groups.push(GroupCommand::new(kind, description));
    }

    /// Close the innermost group. Empty groups leave no trace.
    pub fn end_group(&mut self) {
        if self.replaying {
            return;
        }
        let Some(group) = self.open_groups.pop() else {
            debug_assert!(false, "end_group without begin_group");
            return;
        };
        if group.is_empty() {
            return;
        }
        match self.open_groups.last_mut() {
            Some(outer) => outer.commands.push(Box::new(group)),
            None => self.commit(Box::new(group)),
        }
    }

    pub fn is_group_open(&self) -> bool {
        !self.open_groups.is_empty()
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub(crate) fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    fn commit(&mut self, command: Box<dyn Command>) {
        // Clear redo stack when a new action is performed
        for step in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(step.size);
        }
        let size = command.memory_size();
        self.total_memory += size;
        self.undo_stack.push_back(Step { command, size });
        self.prune();
    }

    // Steps keep their charged size while moving between stacks.

    pub(crate) fn pop_undo(&mut self) -> Option<Step> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Step> {
        self.redo_stack.pop_back()
    }

    pub(crate) fn push_redo(&mut self, step: Step) {
        self.redo_stack.push_back(step);
    }

    pub(crate) fn push_undo_replayed(&mut self, step: Step) {
        self.undo_stack.push_back(step);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|s| s.command.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|s| s.command.description())
    }

    pub fn undo_kind(&self) -> Option<UndoKind> {
        self.undo_stack.back().map(|s| s.command.kind())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|s| s.command.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Prune old commands to stay within limits
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.size);
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.size);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_groups.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    impl Command for Noop {
        fn undo(&mut self, _image: &mut Image) {}
        fn redo(&mut self, _image: &mut Image) {}
        fn description(&self) -> String {
            self.0.to_string()
        }
        fn kind(&self) -> UndoKind {
            UndoKind::Misc
        }
        fn memory_size(&self) -> usize {
            10
        }
    }

    #[test]
    fn nested_groups_collapse_into_one_step() {
        let mut h = HistoryManager::new(10);
        h.begin_group(UndoKind::ImageResize, "Resize Image");
        h.push(Box::new(Noop("a")));
        h.begin_group(UndoKind::Misc, "inner");
        h.push(Box::new(Noop("b")));
        h.end_group();
        h.end_group();
        assert_eq!(h.undo_count(), 1);
        assert_eq!(h.undo_description().as_deref(), Some("Resize Image"));
        assert_eq!(h.undo_kind(), Some(UndoKind::ImageResize));
    }

    #[test]
    fn empty_group_is_dropped() {
        let mut h = HistoryManager::new(10);
        h.begin_group(UndoKind::Misc, "nothing");
        h.end_group();
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn step_limit_prunes_oldest() {
        let mut h = HistoryManager::new(2);
        for name in ["a", "b", "c"] {
            h.push(Box::new(Noop(name)));
        }
        assert_eq!(h.undo_history(), vec!["c".to_string(), "b".to_string()]);
        assert_eq!(h.memory_usage(), 20);
    }

    /// Reports a different size every time it is asked.
    struct Growing(usize);

    impl Command for Growing {
        fn undo(&mut self, _image: &mut Image) {}
        fn redo(&mut self, _image: &mut Image) {}
        fn description(&self) -> String {
            "grow".to_string()
        }
        fn kind(&self) -> UndoKind {
            UndoKind::Misc
        }
        fn memory_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn memory_total_uses_the_size_charged_at_commit() {
        let mut h = HistoryManager::new(10);
        h.push(Box::new(Growing(100)));
        h.push(Box::new(Noop("b")));
        assert_eq!(h.memory_usage(), 110);

        // A record whose live size changed while it sat on the stacks
        let mut step = h.pop_undo().unwrap();
        step.command = Box::new(Growing(5000));
        h.push_undo_replayed(step);
        let step = h.pop_undo().unwrap();
        h.push_redo(step);
        assert_eq!(h.memory_usage(), 110);

        h.push(Box::new(Noop("c")));
        assert_eq!(h.memory_usage(), 110);

        h.set_limits(1, None);
        assert_eq!(h.memory_usage(), 10);
    }

    #[test]
    fn replaying_suppresses_pushes() {
        let mut h = HistoryManager::new(5);
        h.set_replaying(true);
        h.push(Box::new(Noop("x")));
        h.set_replaying(false);
        assert!(!h.can_undo());
    }
}
