//! Grid cells, visibility sets and enter/leave differentials.

use crate::config::AoiConfig;
use crate::error::CoreError;
use crate::types::{EntityId, Position};
use std::collections::{HashMap, HashSet};

/// Integer cell coordinate: `floor(position / grid_size)` per axis.
type CellCoord = (i64, i64);

/// Result of one position update: which entities entered and which left
/// the mover's visible set. Visibility is symmetric under the uniform
/// view distance, so the same sets describe the observers that gained or
/// lost sight of the mover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AoiDelta {
    /// Entities that became visible to the mover
    pub entered: Vec<EntityId>,
    /// Entities that stopped being visible to the mover
    pub left: Vec<EntityId>,
}

impl AoiDelta {
    /// Whether the move changed no visibility at all.
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

/// Counters exposed for monitoring the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct AoiStats {
    /// Entities currently registered
    pub entities: usize,
    /// Non-empty grid cells
    pub occupied_cells: usize,
    /// Position updates processed
    pub updates: u64,
    /// Enter events produced
    pub enters: u64,
    /// Leave events produced
    pub leaves: u64,
}

struct AoiEntry {
    position: Position,
    cell: CellCoord,
    /// Entities this one currently sees (forward set)
    watching: HashSet<EntityId>,
}

/// Nine-grid spatial index with a radius-accurate distance filter.
///
/// Each entity is registered in exactly one cell, always consistent with
/// its last-committed position. Both directions of the visibility
/// relation are maintained: `watching` (what an entity sees) on the
/// entry, `watchers` (who sees it) in a reverse map, so removal can
/// notify observers in O(degree).
pub struct AoiGrid {
    config: AoiConfig,
    cells: HashMap<CellCoord, HashSet<EntityId>>,
    entries: HashMap<EntityId, AoiEntry>,
    /// Reverse visibility: who currently sees the keyed entity
    watchers: HashMap<EntityId, HashSet<EntityId>>,
    updates: u64,
    enters: u64,
    leaves: u64,
}

impl AoiGrid {
    /// Creates an empty index. Fails fast on invalid distances.
    pub fn new(config: AoiConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            config,
            cells: HashMap::new(),
            entries: HashMap::new(),
            watchers: HashMap::new(),
            updates: 0,
            enters: 0,
            leaves: 0,
        })
    }

    fn cell_of(&self, pos: Position) -> CellCoord {
        (
            (pos.x / self.config.grid_size).floor() as i64,
            (pos.y / self.config.grid_size).floor() as i64,
        )
    }

    /// Entities in the 3×3 block around `cell`, excluding `exclude`,
    /// within `view_distance` of `pos`.
    fn scan(&self, cell: CellCoord, pos: Position, exclude: EntityId) -> HashSet<EntityId> {
        let mut visible = HashSet::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(members) = self.cells.get(&(cell.0 + dx, cell.1 + dy)) else {
                    continue;
                };
                for &other in members {
                    if other == exclude {
                        continue;
                    }
                    // Corner cells of the block reach beyond the radius;
                    // the distance filter keeps results radius-accurate.
                    let other_pos = self.entries[&other].position;
                    if pos.plane_distance(other_pos) <= self.config.view_distance {
                        visible.insert(other);
                    }
                }
            }
        }
        visible
    }

    /// Registers an entity and returns its initial visible set.
    ///
    /// Visibility being symmetric, the returned entities simultaneously
    /// gain sight of the newcomer; the caller notifies both sides.
    pub fn add(&mut self, id: EntityId, position: Position) -> Vec<EntityId> {
        debug_assert!(!self.entries.contains_key(&id), "entity registered twice");
        let cell = self.cell_of(position);
        let visible = self.scan(cell, position, id);

        for &other in &visible {
            // The newcomer watches them, they watch the newcomer.
            self.watchers.entry(other).or_default().insert(id);
            self.watchers.entry(id).or_default().insert(other);
            if let Some(entry) = self.entries.get_mut(&other) {
                entry.watching.insert(id);
            }
        }
        self.cells.entry(cell).or_default().insert(id);
        self.entries.insert(
            id,
            AoiEntry {
                position,
                cell,
                watching: visible.clone(),
            },
        );
        self.enters += visible.len() as u64;
        visible.into_iter().collect()
    }

    /// Deregisters an entity, returning the observers that must be told
    /// it disappeared.
    pub fn remove(&mut self, id: EntityId) -> Vec<EntityId> {
        let Some(entry) = self.entries.remove(&id) else {
            return Vec::new();
        };
        if let Some(members) = self.cells.get_mut(&entry.cell) {
            members.remove(&id);
            if members.is_empty() {
                self.cells.remove(&entry.cell);
            }
        }
        for &other in &entry.watching {
            if let Some(w) = self.watchers.get_mut(&other) {
                w.remove(&id);
            }
        }
        let observers = self.watchers.remove(&id).unwrap_or_default();
        for &other in &observers {
            if let Some(e) = self.entries.get_mut(&other) {
                e.watching.remove(&id);
            }
        }
        self.leaves += observers.len() as u64;
        observers.into_iter().collect()
    }

    /// Commits a new position and returns the enter/leave differential.
    ///
    /// When the cell is unchanged only the same 3×3 block is rescanned
    /// and the distance filter reapplied (cheap path); a cell change
    /// additionally migrates the entity between cells. Either way the
    /// result is diffed against the stored visible set, so the returned
    /// sets are exact and an out-and-back move nets to nothing.
    pub fn update(&mut self, id: EntityId, new_position: Position) -> AoiDelta {
        let Some(entry) = self.entries.get(&id) else {
            return AoiDelta::default();
        };
        let old_cell = entry.cell;
        let old_watching = entry.watching.clone();
        let new_cell = self.cell_of(new_position);

        if new_cell != old_cell {
            if let Some(members) = self.cells.get_mut(&old_cell) {
                members.remove(&id);
                if members.is_empty() {
                    self.cells.remove(&old_cell);
                }
            }
            self.cells.entry(new_cell).or_default().insert(id);
        }

        let new_watching = self.scan(new_cell, new_position, id);
        let entered: Vec<EntityId> =
            new_watching.difference(&old_watching).copied().collect();
        let left: Vec<EntityId> = old_watching.difference(&new_watching).copied().collect();

        for &other in &entered {
            self.watchers.entry(other).or_default().insert(id);
            self.watchers.entry(id).or_default().insert(other);
            if let Some(e) = self.entries.get_mut(&other) {
                e.watching.insert(id);
            }
        }
        for &other in &left {
            if let Some(w) = self.watchers.get_mut(&other) {
                w.remove(&id);
            }
            if let Some(w) = self.watchers.get_mut(&id) {
                w.remove(&other);
            }
            if let Some(e) = self.entries.get_mut(&other) {
                e.watching.remove(&id);
            }
        }

        let entry = self.entries.get_mut(&id).expect("checked above");
        entry.position = new_position;
        entry.cell = new_cell;
        entry.watching = new_watching;

        self.updates += 1;
        self.enters += entered.len() as u64;
        self.leaves += left.len() as u64;
        AoiDelta { entered, left }
    }

    /// Snapshot of what an entity currently sees.
    pub fn visible_set(&self, id: EntityId) -> Option<Vec<EntityId>> {
        self.entries
            .get(&id)
            .map(|e| e.watching.iter().copied().collect())
    }

    /// Who currently sees the given entity.
    pub fn observers_of(&self, id: EntityId) -> Vec<EntityId> {
        self.watchers
            .get(&id)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Last-committed position of an entity.
    pub fn position_of(&self, id: EntityId) -> Option<Position> {
        self.entries.get(&id).map(|e| e.position)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the index counters.
    pub fn stats(&self) -> AoiStats {
        AoiStats {
            entities: self.entries.len(),
            occupied_cells: self.cells.len(),
            updates: self.updates,
            enters: self.enters,
            leaves: self.leaves,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn grid() -> AoiGrid {
        AoiGrid::new(AoiConfig {
            grid_size: 100.0,
            view_distance: 150.0,
            update_interval: Duration::from_millis(200),
        })
        .expect("valid config")
    }

    fn id(n: u64) -> EntityId {
        EntityId(n)
    }

    fn at(x: f64, y: f64) -> Position {
        Position::new(x, y, 0.0)
    }

    #[test]
    fn add_returns_radius_accurate_visible_set() {
        let mut g = grid();
        g.add(id(1), at(0.0, 0.0));
        g.add(id(2), at(130.0, 0.0)); // in range
        g.add(id(3), at(140.0, 140.0)); // nine-grid neighbor but ~198 away
        g.add(id(4), at(400.0, 0.0)); // different block entirely

        let visible = g.add(id(5), at(0.0, 0.0));
        let visible: HashSet<_> = visible.into_iter().collect();
        assert!(visible.contains(&id(1)));
        assert!(visible.contains(&id(2)));
        assert!(!visible.contains(&id(3)), "corner false positive must be filtered");
        assert!(!visible.contains(&id(4)));
    }

    #[test]
    fn visibility_is_symmetric() {
        let mut g = grid();
        g.add(id(1), at(0.0, 0.0));
        g.add(id(2), at(100.0, 0.0));
        assert_eq!(g.visible_set(id(1)).unwrap(), vec![id(2)]);
        assert_eq!(g.visible_set(id(2)).unwrap(), vec![id(1)]);
        assert_eq!(g.observers_of(id(1)), vec![id(2)]);
    }

    #[test]
    fn cell_change_produces_enter_and_leave_sets() {
        // The spec §8 scenario: grid 100, view 150, E moves (0,0)->(260,0).
        let mut g = grid();
        g.add(id(10), at(-50.0, 0.0)); // near origin only
        g.add(id(20), at(130.0, 0.0)); // visible from both endpoints
        g.add(id(30), at(300.0, 0.0)); // near destination only
        let initial = g.add(id(1), at(0.0, 0.0));
        let initial: HashSet<_> = initial.into_iter().collect();
        assert_eq!(initial, [id(10), id(20)].into_iter().collect());

        let delta = g.update(id(1), at(260.0, 0.0));
        let entered: HashSet<_> = delta.entered.iter().copied().collect();
        let left: HashSet<_> = delta.left.iter().copied().collect();
        assert_eq!(entered, [id(30)].into_iter().collect());
        assert_eq!(left, [id(10)].into_iter().collect());
        assert!(entered.is_disjoint(&left));

        // 20 at (130,0) stayed visible throughout.
        assert!(g.visible_set(id(1)).unwrap().contains(&id(20)));
    }

    #[test]
    fn same_cell_move_reapplies_distance_filter() {
        let mut g = grid();
        g.add(id(2), at(160.0, 0.0));
        g.add(id(1), at(20.0, 0.0)); // distance 140: visible

        // Move within cell (0,0): distance becomes 155, beyond the radius.
        let delta = g.update(id(1), at(5.0, 0.0));
        assert_eq!(delta.left, vec![id(2)]);
        assert!(delta.entered.is_empty());
        assert!(g.visible_set(id(1)).unwrap().is_empty());
        assert!(g.visible_set(id(2)).unwrap().is_empty(), "symmetry maintained");
    }

    #[test]
    fn out_and_back_is_idempotent() {
        let mut g = grid();
        for n in 0..20 {
            g.add(id(100 + n), at((n as f64) * 37.0 - 300.0, (n as f64) * 23.0 - 200.0));
        }
        let start = at(0.0, 0.0);
        let before: HashSet<_> = g.add(id(1), start).into_iter().collect();

        let mut enters: Vec<EntityId> = Vec::new();
        let mut leaves: Vec<EntityId> = Vec::new();
        let path = [
            at(120.0, 0.0),
            at(260.0, 80.0),
            at(400.0, 200.0),
            at(260.0, 80.0),
            at(120.0, 0.0),
            start,
        ];
        for wp in path {
            let delta = g.update(id(1), wp);
            let e: HashSet<_> = delta.entered.iter().copied().collect();
            let l: HashSet<_> = delta.left.iter().copied().collect();
            assert!(e.is_disjoint(&l), "enter/leave must be disjoint");
            enters.extend(delta.entered);
            leaves.extend(delta.left);
        }

        let after: HashSet<_> = g.visible_set(id(1)).unwrap().into_iter().collect();
        assert_eq!(before, after, "round trip must restore the visible set");
    }

    #[test]
    fn remove_reports_observers() {
        let mut g = grid();
        g.add(id(1), at(0.0, 0.0));
        g.add(id(2), at(50.0, 0.0));
        g.add(id(3), at(1000.0, 0.0));

        let observers: HashSet<_> = g.remove(id(1)).into_iter().collect();
        assert_eq!(observers, [id(2)].into_iter().collect());
        assert!(g.visible_set(id(2)).unwrap().is_empty());
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn membership_tracks_committed_position() {
        let mut g = grid();
        g.add(id(1), at(0.0, 0.0));
        g.update(id(1), at(-250.0, 380.0));
        assert_eq!(g.position_of(id(1)), Some(at(-250.0, 380.0)));
        // Exactly one cell holds the entity.
        assert_eq!(g.stats().occupied_cells, 1);
        assert_eq!(g.stats().entities, 1);
    }

    #[test]
    fn boundary_distance_is_inclusive() {
        let mut g = grid();
        g.add(id(1), at(0.0, 0.0));
        let visible = g.add(id(2), at(150.0, 0.0));
        assert_eq!(visible, vec![id(1)], "exactly view_distance away is visible");
    }
}
