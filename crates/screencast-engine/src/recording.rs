use std::rc::Rc;

use crate::change::{Change, EditOp, Selection};
use crate::error::RecordingError;
use crate::host::DocumentHost;
use crate::interpolate::interpolate;
use crate::project::SharedProject;

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Expand short typing bursts into one change per character
    pub interpolate: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self { interpolate: true }
    }
}

/// Turns raw editor notifications into recorded changes.
///
/// Edits are held until the selection notification that follows them, then
/// stored together as one change. Selection notifications with no edits in
/// front of them are stored as cursor moves.
#[derive(Debug, Default)]
pub struct Recorder {
    project: Option<SharedProject>,
    pending_edits: Vec<EditOp>,
    last_selections: Vec<Selection>,
    options: RecorderOptions,
}

impl Recorder {
    pub fn new(options: RecorderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Begin recording into `project`. A project with nothing recorded yet
    /// takes the editor's current text as its starting content.
    pub fn start<H: DocumentHost + ?Sized>(
        &mut self,
        project: Option<SharedProject>,
        host: Option<&H>,
    ) -> Result<(), RecordingError> {
        let project = project.ok_or(RecordingError::NoActiveProject)?;
        let host = host.ok_or(RecordingError::NoActiveEditor)?;

        project.borrow_mut().begin_recording(&host.full_text());
        log::info!("recording into {}", project.borrow().id());

        self.pending_edits.clear();
        self.last_selections.clear();
        self.project = Some(project);
        Ok(())
    }

    /// Detach from the project. Edits still waiting for a selection are
    /// dropped.
    pub fn stop(&mut self) {
        let Some(project) = self.project.take() else {
            return;
        };
        if !self.pending_edits.is_empty() {
            log::info!(
                "dropping {} edits with no following selection",
                self.pending_edits.len()
            );
        }
        self.pending_edits.clear();
        log::info!("stopped recording {}", project.borrow().id());
    }

    pub fn is_recording(&self) -> bool {
        self.project.is_some()
    }

    pub fn project(&self) -> Option<&SharedProject> {
        self.project.as_ref()
    }

    pub fn pending_edits(&self) -> &[EditOp] {
        &self.pending_edits
    }

    pub fn last_selections(&self) -> &[Selection] {
        &self.last_selections
    }

    /// Replaces any batch still waiting for a selection
    pub fn on_document_changed(&mut self, edits: &[EditOp]) {
        if self.project.is_none() {
            return;
        }
        self.pending_edits = edits.to_vec();
    }

    pub fn on_selection_changed(&mut self, selections: &[Selection]) {
        let Some(project) = &self.project else {
            return;
        };
        self.last_selections = selections.to_vec();

        if self.pending_edits.is_empty() {
            project
                .borrow_mut()
                .add_change(Change::cursor_move(selections.to_vec()));
            return;
        }

        let change = Change::new(std::mem::take(&mut self.pending_edits), selections.to_vec());
        let changes = if self.options.interpolate {
            interpolate(change)
        } else {
            vec![change]
        };
        project.borrow_mut().add_changes(changes);
    }

    /// Start a new breakpoint holding `content`. Returns its id, or `None`
    /// when not recording.
    pub fn add_breakpoint(&mut self, name: &str, content: &str) -> Option<String> {
        let project = self.project.as_ref()?;
        let id = project.borrow_mut().add_breakpoint(name, content);
        log::info!("breakpoint {name:?} added to {}", project.borrow().id());
        Some(id)
    }

    /// Whether `project` is the one being recorded into
    pub fn is_recording_into(&self, project: &SharedProject) -> bool {
        self.project.as_ref().is_some_and(|p| Rc::ptr_eq(p, project))
    }
}
