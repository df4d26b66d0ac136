//! Top-level mode machine tying the store, recorder and player together.
//!
//! [`transition`] is pure and decides which commands are legal in which
//! mode. [`Session::dispatch`] performs the side effects for a legal
//! command and only moves to the next mode once they succeed.

use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::change::{EditOp, Selection};
use crate::debounce::Clock;
use crate::error::{RecordingError, SessionError};
use crate::host::DocumentHost;
use crate::playback::{Player, PlayerOptions, Progress, TickOutcome};
use crate::project::SharedProject;
use crate::recording::{Recorder, RecorderOptions};
use crate::store::ProjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    NoProject,
    ProjectSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle(IdleState),
    Recording,
    Playing(PlayState),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle(IdleState::NoProject)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mode::Idle(IdleState::NoProject) => "Idle",
            Mode::Idle(IdleState::ProjectSelected) => "Ready",
            Mode::Recording => "Recording",
            Mode::Playing(PlayState::Playing) => "Playing",
            Mode::Playing(PlayState::Paused) => "Paused",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateProject(String),
    SelectProject(String),
    DeleteProjects(Vec<String>),
    Record,
    StopRecording,
    AddBreakpoint(String),
    /// Start playback, or resume it when paused
    Play,
    PlayFrom(String),
    Pause,
    StopPlaying,
    /// Raised by the session itself when the player pauses on a breakpoint
    BreakpointReached,
    /// Raised by the session itself when the player runs out of frames
    PlaybackFinished,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateProject(_) => CommandKind::CreateProject,
            Command::SelectProject(_) => CommandKind::SelectProject,
            Command::DeleteProjects(_) => CommandKind::DeleteProjects,
            Command::Record => CommandKind::Record,
            Command::StopRecording => CommandKind::StopRecording,
            Command::AddBreakpoint(_) => CommandKind::AddBreakpoint,
            Command::Play => CommandKind::Play,
            Command::PlayFrom(_) => CommandKind::PlayFrom,
            Command::Pause => CommandKind::Pause,
            Command::StopPlaying => CommandKind::StopPlaying,
            Command::BreakpointReached => CommandKind::BreakpointReached,
            Command::PlaybackFinished => CommandKind::PlaybackFinished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateProject,
    SelectProject,
    DeleteProjects,
    Record,
    StopRecording,
    AddBreakpoint,
    Play,
    PlayFrom,
    Pause,
    StopPlaying,
    BreakpointReached,
    PlaybackFinished,
}

impl CommandKind {
    /// Commands a user can issue, in menu order
    pub const USER: [CommandKind; 10] = [
        CommandKind::CreateProject,
        CommandKind::SelectProject,
        CommandKind::DeleteProjects,
        CommandKind::Record,
        CommandKind::StopRecording,
        CommandKind::AddBreakpoint,
        CommandKind::Play,
        CommandKind::PlayFrom,
        CommandKind::Pause,
        CommandKind::StopPlaying,
    ];
}

/// The mode after `command` in `mode`, or `None` if it is not allowed
pub fn transition(mode: &Mode, command: CommandKind) -> Option<Mode> {
    use CommandKind as C;
    use IdleState::*;

    match (*mode, command) {
        (Mode::Idle(_), C::CreateProject | C::SelectProject) => Some(Mode::Idle(ProjectSelected)),
        (Mode::Idle(state), C::DeleteProjects) => Some(Mode::Idle(state)),
        (Mode::Idle(ProjectSelected), C::Record) => Some(Mode::Recording),
        (Mode::Idle(ProjectSelected), C::Play | C::PlayFrom) => {
            Some(Mode::Playing(PlayState::Playing))
        }

        (Mode::Recording, C::AddBreakpoint) => Some(Mode::Recording),
        (Mode::Recording, C::StopRecording) => Some(Mode::Idle(ProjectSelected)),

        (Mode::Playing(PlayState::Playing), C::Pause | C::BreakpointReached) => {
            Some(Mode::Playing(PlayState::Paused))
        }
        (Mode::Playing(PlayState::Paused), C::Play) => Some(Mode::Playing(PlayState::Playing)),
        (Mode::Playing(_), C::StopPlaying | C::PlaybackFinished) => {
            Some(Mode::Idle(ProjectSelected))
        }

        _ => None,
    }
}

/// User commands accepted in `mode`
pub fn available_commands(mode: &Mode) -> Vec<CommandKind> {
    CommandKind::USER
        .into_iter()
        .filter(|kind| transition(mode, *kind).is_some())
        .collect()
}

/// Everything a front end needs to draw the session's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub mode: Mode,
    pub mode_label: String,
    pub project: Option<String>,
    pub commands: Vec<CommandKind>,
    pub progress_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub player: PlayerOptions,
    pub recorder: RecorderOptions,
}

type ProgressListener = Box<dyn FnMut(&Progress)>;
type PresentationListener = Box<dyn FnMut(&Presentation)>;

pub struct Session<H: DocumentHost> {
    store: ProjectStore,
    clock: Rc<dyn Clock>,
    mode: Mode,
    project: Option<SharedProject>,
    editor: Option<H>,
    recorder: Recorder,
    player: Option<Player>,
    player_options: PlayerOptions,
    progress: Option<Progress>,
    progress_listeners: Vec<ProgressListener>,
    presentation_listeners: Vec<PresentationListener>,
}

impl<H: DocumentHost> Session<H> {
    pub fn new(store: ProjectStore, clock: Rc<dyn Clock>, options: SessionOptions) -> Self {
        Self {
            store,
            clock,
            mode: Mode::default(),
            project: None,
            editor: None,
            recorder: Recorder::new(options.recorder),
            player: None,
            player_options: options.player,
            progress: None,
            progress_listeners: Vec::new(),
            presentation_listeners: Vec::new(),
        }
    }

    pub fn attach_editor(&mut self, editor: H) {
        self.editor = Some(editor);
    }

    /// Take the editor away, stopping anything that depends on it
    pub fn detach_editor(&mut self) -> Option<H> {
        self.halt();
        self.editor.take()
    }

    pub fn editor(&self) -> Option<&H> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut H> {
        self.editor.as_mut()
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ProjectStore {
        &mut self.store
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn project(&self) -> Option<&SharedProject> {
        self.project.as_ref()
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        let kind = command.kind();
        let Some(mut next) = transition(&self.mode, kind) else {
            return Err(SessionError::InvalidTransition {
                mode: self.mode,
                command: kind,
            });
        };

        match command {
            Command::CreateProject(name) => {
                let project = self.store.create(&name)?;
                self.select(project);
            }
            Command::SelectProject(name) => {
                if !self.store.has(&name) {
                    return Err(SessionError::UnknownProject(name));
                }
                let project = self.store.get(&name);
                self.select(project);
            }
            Command::DeleteProjects(ids) => {
                self.store.delete(&ids)?;
                let current_deleted = self
                    .project
                    .as_ref()
                    .is_some_and(|p| ids.iter().any(|id| id == p.borrow().id()));
                if current_deleted {
                    self.project = None;
                    next = Mode::Idle(IdleState::NoProject);
                }
            }
            Command::Record => {
                self.recorder
                    .start(self.project.clone(), self.editor.as_ref())
                    .inspect_err(|e| log::error!("cannot start recording: {e}"))?;
            }
            Command::StopRecording => self.recorder.stop(),
            Command::AddBreakpoint(name) => {
                let editor = self.editor.as_ref().ok_or(RecordingError::NoActiveEditor)?;
                self.recorder
                    .add_breakpoint(&name, &editor.full_text())
                    .ok_or(RecordingError::NoActiveProject)?;
            }
            Command::Play => {
                if self.mode == Mode::Playing(PlayState::Paused)
                    && let Some(player) = self.player.as_mut()
                {
                    player.resume();
                } else {
                    let play_data = self.project.as_ref().map(|p| p.borrow().play_data());
                    let player =
                        Player::start(play_data, self.editor.as_mut(), self.player_options.clone())
                            .inspect_err(|e| log::error!("cannot start playback: {e}"))?;
                    self.start_playing(player);
                }
            }
            Command::PlayFrom(breakpoint_id) => {
                let play_data = self.project.as_ref().map(|p| p.borrow().play_data());
                let player = Player::start_at(
                    play_data,
                    self.editor.as_mut(),
                    &breakpoint_id,
                    self.player_options.clone(),
                )
                .inspect_err(|e| log::error!("cannot start playback: {e}"))?;
                self.start_playing(player);
            }
            Command::Pause => {
                if let Some(player) = self.player.as_mut() {
                    player.pause();
                }
            }
            Command::StopPlaying => {
                if let (Some(player), Some(editor)) = (self.player.as_mut(), self.editor.as_mut()) {
                    player.stop(editor);
                }
                self.player = None;
            }
            Command::BreakpointReached => {}
            Command::PlaybackFinished => self.player = None,
        }

        if next != self.mode {
            log::info!("{} -> {}", self.mode, next);
        }
        self.mode = next;
        self.publish_presentation();
        Ok(())
    }

    fn select(&mut self, project: SharedProject) {
        log::info!("selected project {}", project.borrow().id());
        self.project = Some(project);
    }

    fn start_playing(&mut self, player: Player) {
        self.progress = None;
        self.player = Some(player);
    }

    /// Raw edit notification from the editor
    pub fn on_document_changed(&mut self, edits: &[EditOp]) {
        if self.mode == Mode::Recording {
            self.recorder.on_document_changed(edits);
        }
    }

    /// Raw selection notification from the editor
    pub fn on_selection_changed(&mut self, selections: &[Selection]) {
        if self.mode == Mode::Recording {
            self.recorder.on_selection_changed(selections);
        }
    }

    /// Drive playback and persistence. Call whenever
    /// [`Self::next_deadline`] passes.
    pub fn poll(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let outcome = match (self.player.as_mut(), self.editor.as_mut()) {
            (Some(player), Some(editor)) => player.poll(editor, now),
            _ => TickOutcome::Idle,
        };
        self.handle_outcome(&outcome);
        self.store.flush_due();
        outcome
    }

    /// Play one frame immediately, ignoring the tick interval
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = match (self.player.as_mut(), self.editor.as_mut()) {
            (Some(player), Some(editor)) => player.tick(editor),
            _ => TickOutcome::Idle,
        };
        self.handle_outcome(&outcome);
        outcome
    }

    fn handle_outcome(&mut self, outcome: &TickOutcome) {
        let event = match outcome {
            TickOutcome::Paused(progress) => {
                self.progress = Some(progress.clone());
                for listener in &mut self.progress_listeners {
                    listener(progress);
                }
                Command::BreakpointReached
            }
            TickOutcome::Stopped => Command::PlaybackFinished,
            TickOutcome::Applied | TickOutcome::Idle => return,
        };
        if let Err(e) = self.dispatch(event) {
            log::warn!("{e}");
        }
    }

    /// Earliest moment [`Self::poll`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let now = self.clock.now();
        let tick = self.player.as_ref().and_then(|p| p.next_deadline(now));
        match (tick, self.store.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn presentation(&self) -> Presentation {
        Presentation {
            mode: self.mode,
            mode_label: self.mode.to_string(),
            project: self.project.as_ref().map(|p| p.borrow().id().to_string()),
            commands: available_commands(&self.mode),
            progress_label: match self.mode {
                Mode::Playing(_) => self.progress.as_ref().map(Progress::label),
                _ => None,
            },
        }
    }

    pub fn on_presentation(&mut self, listener: impl FnMut(&Presentation) + 'static) {
        self.presentation_listeners.push(Box::new(listener));
    }

    pub fn on_progress(&mut self, listener: impl FnMut(&Progress) + 'static) {
        self.progress_listeners.push(Box::new(listener));
    }

    fn publish_presentation(&mut self) {
        if self.presentation_listeners.is_empty() {
            return;
        }
        let presentation = self.presentation();
        for listener in &mut self.presentation_listeners {
            listener(&presentation);
        }
    }

    fn halt(&mut self) {
        self.recorder.stop();
        if let (Some(player), Some(editor)) = (self.player.as_mut(), self.editor.as_mut()) {
            player.stop(editor);
        }
        self.player = None;
        if matches!(self.mode, Mode::Recording | Mode::Playing(_)) {
            self.mode = Mode::Idle(IdleState::ProjectSelected);
            self.publish_presentation();
        }
    }

    /// Stop recording and playback, then write everything still pending.
    /// Returns the number of projects written.
    pub fn shutdown(&mut self) -> usize {
        self.halt();
        self.store.flush_all()
    }
}
