use super::{InstanceKey, TimerSnapshot};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Slot {
    snapshot: Option<TimerSnapshot>,
    mounts: u32,
}

/// Snapshots preserved by torn-down instances, keyed by logical instance.
#[derive(Default)]
pub struct SnapshotSlots {
    slots: Mutex<HashMap<InstanceKey, Slot>>,
}

impl SnapshotSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a mount of `key`; returns 1 on the first mount.
    pub fn record_mount(&self, key: &InstanceKey) -> u32 {
        let mut slots = self.lock();
        let slot = slots.entry(key.clone()).or_default();
        slot.mounts = slot.mounts.saturating_add(1);
        slot.mounts
    }

    pub fn preserve(&self, key: &InstanceKey, snapshot: TimerSnapshot) {
        self.lock().entry(key.clone()).or_default().snapshot = Some(snapshot);
    }

    /// Remove and return the preserved snapshot, if any.
    pub fn take(&self, key: &InstanceKey) -> Option<TimerSnapshot> {
        self.lock().get_mut(key).and_then(|slot| slot.snapshot.take())
    }

    pub fn mount_count(&self, key: &InstanceKey) -> u32 {
        self.lock().get(key).map(|slot| slot.mounts).unwrap_or(0)
    }

    /// Drop every slot belonging to a task, e.g. after the task was deleted.
    pub fn forget_task(&self, task_id: &str) {
        self.lock().retain(|key, _| key.task_id != task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_slot_but_keeps_mount_count() {
        let slots = SnapshotSlots::new();
        let key = InstanceKey::new("t1", "list");
        assert_eq!(slots.record_mount(&key), 1);
        slots.preserve(
            &key,
            TimerSnapshot {
                is_active: true,
                elapsed_seconds: 12,
            },
        );
        assert_eq!(slots.take(&key).map(|s| s.elapsed_seconds), Some(12));
        assert_eq!(slots.take(&key), None);
        assert_eq!(slots.record_mount(&key), 2);
    }

    #[test]
    fn sessions_do_not_share_snapshots() {
        let slots = SnapshotSlots::new();
        slots.preserve(&InstanceKey::new("t1", "a"), TimerSnapshot::default());
        assert_eq!(slots.take(&InstanceKey::new("t1", "b")), None);
        assert_eq!(slots.mount_count(&InstanceKey::new("t1", "b")), 0);
    }
}
