//! Auto-sync hazard tracker.
//!
//! Tracks which pipeline resources are in use by commands that may still be
//! in flight. Before a command changes a resource that is in use, the
//! matching sync must go out first.

use heapless::Vec;
use rdq_commands::{rdp, resource};

/// Sync command categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Tile,
    Load,
    Pipe,
    Full,
}

impl SyncKind {
    pub fn command_id(self) -> u8 {
        match self {
            SyncKind::Tile => rdp::SYNC_TILE,
            SyncKind::Load => rdp::SYNC_LOAD,
            SyncKind::Pipe => rdp::SYNC_PIPE,
            SyncKind::Full => rdp::SYNC_FULL,
        }
    }

    /// Resources released once this sync has executed.
    pub fn clears(self) -> u32 {
        match self {
            SyncKind::Tile => resource::TILES,
            SyncKind::Load => resource::TMEM,
            SyncKind::Pipe => resource::PIPE,
            SyncKind::Full => resource::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoSync {
    in_use: u32,
}

impl AutoSync {
    /// Nothing in flight.
    pub const fn idle() -> Self {
        Self { in_use: 0 }
    }

    /// Everything possibly in flight: the state after running unknown work.
    pub const fn saturated() -> Self {
        Self {
            in_use: resource::ALL,
        }
    }

    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// Syncs required before a command changing `changes`, in emission
    /// order. The caller must report each one through [`AutoSync::on_sync`].
    pub fn required(&self, changes: u32) -> Vec<SyncKind, 3> {
        let hazards = changes & self.in_use;
        let mut syncs = Vec::new();
        for kind in [SyncKind::Tile, SyncKind::Load, SyncKind::Pipe] {
            if hazards & kind.clears() != 0 {
                // At most three categories.
                let _ = syncs.push(kind);
            }
        }
        syncs
    }

    /// Mark resources a just-emitted command reads.
    pub fn mark_used(&mut self, uses: u32) {
        self.in_use |= uses;
    }

    /// Record that a sync was emitted.
    pub fn on_sync(&mut self, kind: SyncKind) {
        self.in_use &= !kind.clears();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdq_commands::resource::{tile, PIPE, TMEM};

    #[test]
    fn idle_needs_nothing() {
        let sync = AutoSync::idle();
        assert!(sync.required(resource::ALL).is_empty());
    }

    #[test]
    fn tile_touched_twice_needs_one_sync() {
        let mut sync = AutoSync::idle();
        assert!(sync.required(tile(0)).is_empty());
        sync.mark_used(tile(0));

        let first = sync.required(tile(0));
        assert_eq!(first.as_slice(), &[SyncKind::Tile]);
        sync.on_sync(SyncKind::Tile);

        assert!(sync.required(tile(0)).is_empty());
    }

    #[test]
    fn tile_sync_releases_every_tile() {
        let mut sync = AutoSync::idle();
        sync.mark_used(tile(1) | tile(5) | TMEM);
        sync.on_sync(SyncKind::Tile);
        assert_eq!(sync.in_use(), TMEM);
    }

    #[test]
    fn unrelated_change_needs_nothing() {
        let mut sync = AutoSync::idle();
        sync.mark_used(tile(3));
        assert!(sync.required(tile(2) | TMEM).is_empty());
    }

    #[test]
    fn saturated_orders_tile_load_pipe() {
        let sync = AutoSync::saturated();
        let kinds = sync.required(tile(0) | TMEM | PIPE);
        assert_eq!(kinds.as_slice(), &[SyncKind::Tile, SyncKind::Load, SyncKind::Pipe]);
    }

    #[test]
    fn full_sync_clears_all() {
        let mut sync = AutoSync::saturated();
        sync.on_sync(SyncKind::Full);
        assert_eq!(sync, AutoSync::idle());
    }
}
