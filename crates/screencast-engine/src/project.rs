use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use uuid::Uuid;

use crate::change::Change;
use crate::store::SaveQueue;

/// Name of the breakpoint every project starts with
pub const RECORD_START: &str = "RECORD START";

/// A named waypoint: the document text when it was created and the changes
/// recorded after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    pub id: String,
    pub name: String,
    pub content: String,
    pub changes: Vec<Change>,
}

impl Breakpoint {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            content: content.into(),
            changes: Vec::new(),
        }
    }
}

/// Everything recorded for one project. Always holds at least the seed
/// breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectData {
    pub initial_content: String,
    pub breakpoints: Vec<Breakpoint>,
}

impl ProjectData {
    pub fn new(initial_content: impl Into<String>) -> Self {
        let initial_content = initial_content.into();
        Self {
            breakpoints: vec![Breakpoint::new(RECORD_START, initial_content.clone())],
            initial_content,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.breakpoints.iter().map(|b| b.changes.len()).sum()
    }

    /// Anything recorded beyond the seed
    pub fn has_history(&self) -> bool {
        self.total_changes() > 0 || self.breakpoints.len() > 1
    }

    /// Flatten into `[Breakpoint, Change.., Breakpoint, Change..]`
    pub fn play_data(&self) -> PlayData {
        let total_breakpoints = self.breakpoints.len();
        let frames = self
            .breakpoints
            .iter()
            .enumerate()
            .flat_map(|(i, breakpoint)| {
                std::iter::once(PlayFrame::Breakpoint {
                    number: i + 1,
                    name: breakpoint.name.clone(),
                    id: breakpoint.id.clone(),
                    content: breakpoint.content.clone(),
                })
                .chain(breakpoint.changes.iter().cloned().map(PlayFrame::Change))
            })
            .collect();

        PlayData {
            initial_content: self.initial_content.clone(),
            frames,
            total_breakpoints,
        }
    }

    pub fn summary(&self, id: &str) -> ProjectSummary {
        ProjectSummary {
            id: id.to_string(),
            total_change_count: self.total_changes(),
            breakpoints: self
                .breakpoints
                .iter()
                .map(|b| BreakpointSummary {
                    id: b.id.clone(),
                    name: b.name.clone(),
                    change_count: b.changes.len(),
                })
                .collect(),
        }
    }
}

impl Default for ProjectData {
    fn default() -> Self {
        Self::new("")
    }
}

/// All projects, keyed by id
pub type ProjectMap = BTreeMap<String, ProjectData>;

/// One step of a replay
#[derive(Debug, Clone, PartialEq)]
pub enum PlayFrame {
    Breakpoint {
        /// 1-based position among the project's breakpoints
        number: usize,
        name: String,
        id: String,
        content: String,
    },
    Change(Change),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayData {
    pub initial_content: String,
    pub frames: Vec<PlayFrame>,
    pub total_breakpoints: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSummary {
    pub id: String,
    pub name: String,
    pub change_count: usize,
}

/// Listing entry for navigation UIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: String,
    pub total_change_count: usize,
    pub breakpoints: Vec<BreakpointSummary>,
}

pub type SharedProject = Rc<RefCell<Project>>;

/// A project as handed out by the store. Every mutating method schedules a
/// debounced save; there is no other way to change the data.
#[derive(Debug)]
pub struct Project {
    id: String,
    data: ProjectData,
    saves: SaveQueue,
}

impl Project {
    pub(crate) fn new(id: String, data: ProjectData, saves: SaveQueue) -> Self {
        Self { id, data, saves }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &ProjectData {
        &self.data
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.data.breakpoints
    }

    pub fn play_data(&self) -> PlayData {
        self.data.play_data()
    }

    pub fn summary(&self) -> ProjectSummary {
        self.data.summary(&self.id)
    }

    /// Append to the current (last) breakpoint
    pub fn add_change(&mut self, change: Change) {
        self.add_changes(std::iter::once(change));
    }

    pub fn add_changes(&mut self, changes: impl IntoIterator<Item = Change>) {
        // ProjectData always keeps its seed breakpoint
        if let Some(current) = self.data.breakpoints.last_mut() {
            current.changes.extend(changes);
            log::debug!(
                "project {}: {} changes under {:?}",
                self.id,
                current.changes.len(),
                current.name
            );
        }
        self.save();
    }

    /// Start a new breakpoint holding a snapshot of `content`; returns its id
    pub fn add_breakpoint(&mut self, name: impl Into<String>, content: impl Into<String>) -> String {
        let breakpoint = Breakpoint::new(name, content);
        let id = breakpoint.id.clone();
        self.data.breakpoints.push(breakpoint);
        self.save();
        id
    }

    pub fn rename_breakpoint(&mut self, id: &str, name: impl Into<String>) -> bool {
        let Some(breakpoint) = self.data.breakpoints.iter_mut().find(|b| b.id == id) else {
            return false;
        };
        breakpoint.name = name.into();
        self.save();
        true
    }

    /// Remove the breakpoint and everything recorded after it.
    ///
    /// Deleting the seed breakpoint keeps the seed itself but discards all of
    /// its changes and every later breakpoint.
    pub fn delete_breakpoint(&mut self, id: &str) -> bool {
        let Some(index) = self.data.breakpoints.iter().position(|b| b.id == id) else {
            return false;
        };
        if index == 0 {
            self.data.breakpoints.truncate(1);
            self.data.breakpoints[0].changes.clear();
        } else {
            self.data.breakpoints.truncate(index);
        }
        self.save();
        true
    }

    /// Capture the editor text as the starting point of a project that has
    /// nothing recorded yet. Projects with history are left alone.
    pub fn begin_recording(&mut self, text: &str) {
        if self.data.has_history() {
            return;
        }
        if self.data.initial_content == text {
            return;
        }
        self.data.initial_content = text.to_string();
        self.data.breakpoints[0].content = text.to_string();
        self.save();
    }

    fn save(&self) {
        self.saves.schedule(&self.id);
    }
}
