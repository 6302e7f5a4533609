//! The live breakpoint table.
//!
//! Ids are handed out monotonically and never reused within one backend.
//! Every mutation reports the files whose breakpoints changed so the
//! session can push those files to the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tether_core::{Breakpoint, BreakpointId, LiveBreakpoint};

/// Breakpoints known to the running backend.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    next_id: u32,
    entries: Vec<LiveBreakpoint>,
    snapshot: Option<BTreeMap<BreakpointId, bool>>,
}

impl BreakpointTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// All live breakpoints in creation order.
    pub fn list(&self) -> &[LiveBreakpoint] {
        &self.entries
    }

    /// Add a breakpoint and return its id.
    pub fn insert(&mut self, spec: Breakpoint) -> BreakpointId {
        self.next_id += 1;
        let id = BreakpointId(self.next_id);
        self.entries.push(LiveBreakpoint { id, spec });
        id
    }

    /// Remove a breakpoint. Returns the file it was in.
    pub fn remove(&mut self, id: BreakpointId) -> Option<PathBuf> {
        let index = self.entries.iter().position(|bp| bp.id == id)?;
        Some(self.entries.remove(index).spec.file)
    }

    /// Enable or disable one breakpoint. Returns its file if anything changed.
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Option<PathBuf> {
        let bp = self.entries.iter_mut().find(|bp| bp.id == id)?;
        if bp.spec.enabled == enabled {
            return None;
        }
        bp.spec.enabled = enabled;
        Some(bp.spec.file.clone())
    }

    /// Enable or disable every breakpoint. Returns the files that changed.
    pub fn set_all_enabled(&mut self, enabled: bool) -> BTreeSet<PathBuf> {
        let mut changed = BTreeSet::new();
        for bp in &mut self.entries {
            if bp.spec.enabled != enabled {
                bp.spec.enabled = enabled;
                changed.insert(bp.spec.file.clone());
            }
        }
        changed
    }

    /// Remove every breakpoint. Returns the files that had any.
    pub fn clear(&mut self) -> BTreeSet<PathBuf> {
        self.snapshot = None;
        self.entries.drain(..).map(|bp| bp.spec.file).collect()
    }

    /// Remember each breakpoint's enabled flag, then disable them all.
    ///
    /// Does nothing while an earlier non-empty snapshot is still pending,
    /// so the first pattern is the one restored. An empty snapshot is
    /// replaced.
    pub fn disable_with_snapshot(&mut self) -> BTreeSet<PathBuf> {
        if self.snapshot.as_ref().is_some_and(|s| !s.is_empty()) {
            return BTreeSet::new();
        }
        self.snapshot = Some(
            self.entries
                .iter()
                .map(|bp| (bp.id, bp.spec.enabled))
                .collect(),
        );
        self.set_all_enabled(false)
    }

    /// Re-enable what was enabled when the snapshot was taken and drop it.
    ///
    /// Breakpoints created after the snapshot are left alone.
    pub fn restore_snapshot(&mut self) -> BTreeSet<PathBuf> {
        let Some(snapshot) = self.snapshot.take() else {
            return BTreeSet::new();
        };
        let mut changed = BTreeSet::new();
        for bp in &mut self.entries {
            if snapshot.get(&bp.id) == Some(&true) && !bp.spec.enabled {
                bp.spec.enabled = true;
                changed.insert(bp.spec.file.clone());
            }
        }
        changed
    }

    /// Whether a snapshot is pending.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Files that have at least one breakpoint.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        self.entries.iter().map(|bp| bp.spec.file.clone()).collect()
    }

    /// Enabled breakpoints in `file`, as the engine should see them.
    pub fn enabled_in(&self, file: &Path) -> Vec<Breakpoint> {
        self.entries
            .iter()
            .filter(|bp| bp.spec.enabled && bp.spec.file == file)
            .map(|bp| bp.spec.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (BreakpointTable, BreakpointId, BreakpointId, BreakpointId) {
        let mut table = BreakpointTable::new();
        let a = table.insert(Breakpoint::new("/a.c", 1));
        let b = table.insert(Breakpoint::new("/a.c", 5));
        let c = table.insert(Breakpoint::new("/b.c", 2));
        (table, a, b, c)
    }

    fn pattern(table: &BreakpointTable) -> Vec<bool> {
        table.list().iter().map(|bp| bp.spec.enabled).collect()
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let (mut table, a, b, c) = table();
        assert_eq!((a, b, c), (BreakpointId(1), BreakpointId(2), BreakpointId(3)));
        assert_eq!(table.remove(c), Some(PathBuf::from("/b.c")));
        assert_eq!(table.insert(Breakpoint::new("/b.c", 2)), BreakpointId(4));
        assert_eq!(table.remove(c), None);
    }

    #[test]
    fn enabling_reports_only_real_changes() {
        let (mut table, a, _, _) = table();
        assert_eq!(table.set_enabled(a, true), None);
        assert_eq!(table.set_enabled(a, false), Some(PathBuf::from("/a.c")));
        assert_eq!(table.set_enabled(BreakpointId(99), false), None);
        assert_eq!(table.enabled_in(Path::new("/a.c")).len(), 1);
    }

    #[test]
    fn disable_all_lists_touched_files() {
        let (mut table, _, _, c) = table();
        table.set_enabled(c, false);
        let changed = table.set_all_enabled(false);
        assert_eq!(changed, BTreeSet::from([PathBuf::from("/a.c")]));
        assert_eq!(pattern(&table), vec![false, false, false]);
    }

    #[test]
    fn second_disable_keeps_first_snapshot() {
        let (mut table, _, b, _) = table();
        table.set_enabled(b, false);
        let original = pattern(&table);

        assert!(!table.disable_with_snapshot().is_empty());
        assert!(table.has_snapshot());
        assert!(table.disable_with_snapshot().is_empty());
        assert_eq!(pattern(&table), vec![false, false, false]);

        table.restore_snapshot();
        assert_eq!(pattern(&table), original);
        assert!(!table.has_snapshot());
    }

    #[test]
    fn empty_snapshot_is_retaken() {
        let mut table = BreakpointTable::new();
        assert!(table.disable_with_snapshot().is_empty());

        table.insert(Breakpoint::new("/a.c", 3));
        assert_eq!(
            table.disable_with_snapshot(),
            BTreeSet::from([PathBuf::from("/a.c")])
        );
        assert_eq!(pattern(&table), vec![false]);

        table.restore_snapshot();
        assert_eq!(pattern(&table), vec![true]);
        assert!(!table.has_snapshot());
    }

    #[test]
    fn restore_without_snapshot_is_a_no_op() {
        let (mut table, a, _, _) = table();
        table.set_enabled(a, false);
        assert!(table.restore_snapshot().is_empty());
        assert_eq!(pattern(&table), vec![false, true, true]);
    }

    #[test]
    fn breakpoints_added_after_snapshot_are_left_alone() {
        let (mut table, _, _, _) = table();
        table.disable_with_snapshot();
        let late = table.insert(Breakpoint::new("/c.c", 0).with_enabled(false));
        table.restore_snapshot();
        let late = table.list().iter().find(|bp| bp.id == late).unwrap();
        assert!(!late.spec.enabled);
    }

    #[test]
    fn clear_drops_snapshot() {
        let (mut table, _, _, _) = table();
        table.disable_with_snapshot();
        let files = table.clear();
        assert_eq!(files.len(), 2);
        assert!(table.list().is_empty());
        assert!(!table.has_snapshot());
    }
}
