// crates/sable-sema/src/path.rs
//! Flow-sensitive tracking of incidents along execution paths.
//!
//! The analyser maintains a stack of frames. Incidents recorded in a frame
//! are *certain* (they happen on every path through the frame) and
//! *potential* (they happen on at least one path). Branches are analysed
//! in child frames; when a set of mutually exclusive branches finishes,
//! the intersection of their certain sets and the union of their potential
//! sets are merged into the enclosing frame. Branches that may not run at
//! all (loop bodies, an if without an else) contribute only their
//! potential sets.

use rustc_hash::FxHashSet;

use crate::type_def::VariableId;

/// Something that happens along an execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Incident {
    /// The function returned (or raised).
    Returned,
    /// The receiver was accessed.
    UsedSelf,
    /// The superclass initializer was called.
    CalledSuperInitializer,
    /// A variable was assigned. Instance variables and locals have
    /// separate id spaces.
    Initialized { instance: bool, id: VariableId },
}

impl Incident {
    pub fn initialized(instance: bool, id: VariableId) -> Self {
        Incident::Initialized { instance, id }
    }
}

#[derive(Debug, Default)]
struct Frame {
    certain: FxHashSet<Incident>,
    potential: FxHashSet<Incident>,
    /// Finished branch records awaiting a `finish_*` call.
    branches: Vec<(FxHashSet<Incident>, FxHashSet<Incident>)>,
}

#[derive(Debug)]
pub struct PathAnalyser {
    frames: Vec<Frame>,
}

impl Default for PathAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl PathAnalyser {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn record(&mut self, incident: Incident) {
        let frame = self.frames.last_mut().unwrap();
        frame.certain.insert(incident);
        frame.potential.insert(incident);
    }

    /// Opens a new branch; incidents recorded until the matching
    /// `end_branch` belong to it.
    pub fn begin_branch(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Closes the current branch and parks its record on the enclosing
    /// frame.
    pub fn end_branch(&mut self) {
        let frame = self.frames.pop().unwrap();
        self.frames
            .last_mut()
            .unwrap()
            .branches
            .push((frame.certain, frame.potential));
    }

    /// Merges the parked branches as mutually exclusive and exhaustive:
    /// an incident is certain if every branch made it certain, potential
    /// if any branch did.
    pub fn finish_mutually_exclusive_branches(&mut self) {
        let frame = self.frames.last_mut().unwrap();
        let branches = std::mem::take(&mut frame.branches);
        let Some((first_certain, _)) = branches.first() else {
            return;
        };
        let mut certain = first_certain.clone();
        for (branch_certain, _) in &branches[1..] {
            certain.retain(|incident| branch_certain.contains(incident));
        }
        frame.certain.extend(certain);
        for (_, potential) in &branches {
            frame.potential.extend(potential.iter().copied());
        }
    }

    /// Merges the parked branches as possibly skipped: only their
    /// potential sets survive.
    pub fn finish_uncertain_branches(&mut self) {
        let frame = self.frames.last_mut().unwrap();
        let branches = std::mem::take(&mut frame.branches);
        for (_, potential) in branches {
            frame.potential.extend(potential);
        }
    }

    /// Whether the incident happened on every path to the current point.
    pub fn has_certainly(&self, incident: Incident) -> bool {
        self.frames.iter().any(|f| f.certain.contains(&incident))
    }

    /// Whether the incident may have happened on some path.
    pub fn has_potentially(&self, incident: Incident) -> bool {
        self.frames.iter().any(|f| f.potential.contains(&incident))
    }
}
