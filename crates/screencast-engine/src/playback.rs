//! Frame-by-frame replay of a project into a [`DocumentHost`].
//!
//! The player owns no timer. Something outside calls [`Player::poll`] (or
//! [`Player::tick`] directly) and uses [`Player::next_deadline`] to know when
//! the next frame is due.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::change::Change;
use crate::error::PlaybackError;
use crate::host::DocumentHost;
use crate::project::{PlayData, PlayFrame};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(80);

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub tick_interval: Duration,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Stops a running player at the next tick boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Stopped,
}

/// Reported each time playback reaches a breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Index of the breakpoint frame in the flattened sequence
    pub current_frame: usize,
    pub total_breakpoints: usize,
    pub breakpoint_number: usize,
    pub breakpoint_name: String,
}

impl Progress {
    /// `"<number>/<total>"`
    pub fn label(&self) -> String {
        format!("{}/{}", self.breakpoint_number, self.total_breakpoints)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A change frame was handed to the host
    Applied,
    /// Reached a breakpoint and paused
    Paused(Progress),
    /// Ran out of frames or was cancelled
    Stopped,
    /// Not playing, nothing happened
    Idle,
}

#[derive(Debug)]
pub struct Player {
    frames: Vec<PlayFrame>,
    total_breakpoints: usize,
    cursor: usize,
    state: PlayerState,
    options: PlayerOptions,
    cancel: CancelToken,
    next_tick: Option<Instant>,
    progress: Option<Progress>,
}

impl Player {
    /// Prepare `host` and start playing from the first frame.
    ///
    /// The host is focused, reset to the project's initial content if it
    /// differs, and stops accepting typed input until the player stops.
    pub fn start<H: DocumentHost + ?Sized>(
        play_data: Option<PlayData>,
        host: Option<&mut H>,
        options: PlayerOptions,
    ) -> Result<Self, PlaybackError> {
        let host = host.ok_or(PlaybackError::NoActiveEditor)?;
        let play_data = play_data.ok_or(PlaybackError::NoPlayData)?;

        host.focus();
        if host.full_text() != play_data.initial_content {
            host.replace_all_text(&play_data.initial_content)?;
        }
        host.suppress_typing_input();

        log::info!(
            "playback started: {} frames, {} breakpoints",
            play_data.frames.len(),
            play_data.total_breakpoints
        );
        Ok(Self::new(play_data, 0, options))
    }

    /// Start at the breakpoint with `breakpoint_id`, showing its snapshot.
    /// The first tick pauses on that breakpoint.
    pub fn start_at<H: DocumentHost + ?Sized>(
        play_data: Option<PlayData>,
        host: Option<&mut H>,
        breakpoint_id: &str,
        options: PlayerOptions,
    ) -> Result<Self, PlaybackError> {
        let host = host.ok_or(PlaybackError::NoActiveEditor)?;
        let play_data = play_data.ok_or(PlaybackError::NoPlayData)?;

        let (cursor, content) = play_data
            .frames
            .iter()
            .enumerate()
            .find_map(|(i, frame)| match frame {
                PlayFrame::Breakpoint { id, content, .. } if id == breakpoint_id => {
                    Some((i, content.clone()))
                }
                _ => None,
            })
            .ok_or_else(|| PlaybackError::UnknownBreakpoint(breakpoint_id.to_string()))?;

        host.focus();
        if host.full_text() != content {
            host.replace_all_text(&content)?;
        }
        host.suppress_typing_input();

        log::info!("playback started at frame {cursor}");
        Ok(Self::new(play_data, cursor, options))
    }

    fn new(play_data: PlayData, cursor: usize, options: PlayerOptions) -> Self {
        Self {
            frames: play_data.frames,
            total_breakpoints: play_data.total_breakpoints,
            cursor,
            state: PlayerState::Playing,
            options,
            cancel: CancelToken::default(),
            next_tick: None,
            progress: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The most recent breakpoint reached
    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Play one frame
    pub fn tick<H: DocumentHost + ?Sized>(&mut self, host: &mut H) -> TickOutcome {
        if self.cancel.is_cancelled() && self.state != PlayerState::Stopped {
            log::info!("playback cancelled");
            self.finish(host);
            return TickOutcome::Stopped;
        }
        match self.state {
            PlayerState::Playing => {}
            PlayerState::Paused => return TickOutcome::Idle,
            PlayerState::Stopped => return TickOutcome::Stopped,
        }

        let Some(frame) = self.frames.get(self.cursor) else {
            log::info!("playback finished");
            self.finish(host);
            return TickOutcome::Stopped;
        };
        let index = self.cursor;
        self.cursor += 1;

        match frame {
            PlayFrame::Breakpoint { number, name, .. } => {
                let progress = Progress {
                    current_frame: index,
                    total_breakpoints: self.total_breakpoints,
                    breakpoint_number: *number,
                    breakpoint_name: name.clone(),
                };
                log::info!("breakpoint {} {:?}", progress.label(), name);
                self.state = PlayerState::Paused;
                self.next_tick = None;
                self.progress = Some(progress.clone());
                TickOutcome::Paused(progress)
            }
            PlayFrame::Change(change) => {
                apply_change(host, index, change);
                TickOutcome::Applied
            }
        }
    }

    /// Tick if a frame is due at `now`
    pub fn poll<H: DocumentHost + ?Sized>(&mut self, host: &mut H, now: Instant) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return self.tick(host);
        }
        if self.state != PlayerState::Playing {
            return TickOutcome::Idle;
        }
        if self.next_tick.is_some_and(|due| due > now) {
            return TickOutcome::Idle;
        }
        self.next_tick = Some(now + self.options.tick_interval);
        self.tick(host)
    }

    /// When the next frame is due. `None` unless playing.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        match self.state {
            PlayerState::Playing => Some(self.next_tick.unwrap_or(now)),
            _ => None,
        }
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.state = PlayerState::Paused;
        self.next_tick = None;
        true
    }

    /// Continue from the same cursor
    pub fn resume(&mut self) -> bool {
        if self.state != PlayerState::Paused {
            return false;
        }
        self.state = PlayerState::Playing;
        true
    }

    /// Stop from any state, handing typed input back to the host
    pub fn stop<H: DocumentHost + ?Sized>(&mut self, host: &mut H) {
        if self.state != PlayerState::Stopped {
            log::info!("playback stopped at frame {}", self.cursor);
            self.finish(host);
        }
    }

    fn finish<H: DocumentHost + ?Sized>(&mut self, host: &mut H) {
        self.state = PlayerState::Stopped;
        self.next_tick = None;
        host.restore_typing_input();
    }
}

/// Edits, then selections, then reveal. Failures are logged and skipped.
fn apply_change<H: DocumentHost + ?Sized>(host: &mut H, index: usize, change: &Change) {
    if !change.edits.is_empty()
        && let Err(e) = host.apply_edits(&change.edits)
    {
        log::warn!("frame {index}: {e}");
    }
    if change.selections.is_empty() {
        return;
    }
    match host.set_selections(&change.selections) {
        Ok(()) => host.reveal_range(change.selections[0].range()),
        Err(e) => log::warn!("frame {index}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{EditOp, Position, Range, Selection};
    use crate::editor::RopeDocument;
    use crate::project::ProjectData;
    use pretty_assertions::assert_eq;

    fn insert(line: usize, at: usize, text: &str) -> Change {
        Change::new(
            vec![EditOp::insert(Position::new(line, at), at, text)],
            vec![Selection::caret(Position::new(line, at + text.chars().count()))],
        )
    }

    fn two_breakpoints() -> ProjectData {
        let mut data = ProjectData::new("");
        data.breakpoints[0].changes.push(insert(0, 0, "a"));
        data.breakpoints[0].changes.push(insert(0, 1, "b"));
        let mut second = crate::project::Breakpoint::new("second", "ab");
        second.changes.push(insert(0, 2, "c"));
        data.breakpoints.push(second);
        data
    }

    fn run_until_stop(player: &mut Player, doc: &mut RopeDocument) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..100 {
            let outcome = player.tick(doc);
            if let TickOutcome::Paused(_) = outcome {
                player.resume();
            }
            let done = outcome == TickOutcome::Stopped;
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn test_start_requires_editor_and_play_data() {
        let data = ProjectData::default().play_data();
        let no_editor = Player::start::<RopeDocument>(Some(data), None, PlayerOptions::default());
        assert!(matches!(no_editor, Err(PlaybackError::NoActiveEditor)));

        let mut doc = RopeDocument::new("");
        let no_data = Player::start(None, Some(&mut doc), PlayerOptions::default());
        assert!(matches!(no_data, Err(PlaybackError::NoPlayData)));
        assert!(!doc.is_typing_suppressed());
    }

    #[test]
    fn test_start_resets_buffer_and_suppresses_typing() {
        let mut doc = RopeDocument::new("stale text");
        let player = Player::start(
            Some(ProjectData::new("fresh").play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();

        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(doc.text(), "fresh");
        assert!(doc.is_focused());
        assert!(doc.is_typing_suppressed());
    }

    #[test]
    fn test_empty_project_stops_after_seed_breakpoint() {
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(ProjectData::new("").play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();

        let outcomes = run_until_stop(&mut player, &mut doc);

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], TickOutcome::Paused(p) if p.label() == "1/1"));
        assert_eq!(outcomes[1], TickOutcome::Stopped);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(!doc.is_typing_suppressed());
    }

    #[test]
    fn test_full_replay_reproduces_recording() {
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();

        let outcomes = run_until_stop(&mut player, &mut doc);

        let labels: Vec<String> = outcomes
            .iter()
            .filter_map(|o| match o {
                TickOutcome::Paused(p) => Some(p.label()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["1/2", "2/2"]);
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.selections(), &[Selection::caret(Position::new(0, 3))]);
        assert_eq!(doc.revealed_range(), Some(Range::empty(Position::new(0, 3))));
    }

    #[test]
    fn test_bad_frame_is_skipped_and_replay_continues() {
        let mut data = ProjectData::new("");
        data.breakpoints[0].changes.push(insert(5, 0, "nowhere"));
        data.breakpoints[0].changes.push(insert(0, 0, "ok"));

        let mut doc = RopeDocument::new("");
        let mut player =
            Player::start(Some(data.play_data()), Some(&mut doc), PlayerOptions::default())
                .unwrap();
        let outcomes = run_until_stop(&mut player, &mut doc);

        assert_eq!(outcomes.last(), Some(&TickOutcome::Stopped));
        assert_eq!(doc.text(), "ok");
    }

    #[test]
    fn test_pause_is_immediate_and_resume_keeps_cursor() {
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();
        player.tick(&mut doc);
        player.resume();
        assert_eq!(player.tick(&mut doc), TickOutcome::Applied);

        assert!(player.pause());
        assert_eq!(player.tick(&mut doc), TickOutcome::Idle);
        assert_eq!(player.cursor(), 2);

        assert!(player.resume());
        assert_eq!(player.tick(&mut doc), TickOutcome::Applied);
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_cancel_stops_at_next_tick_and_restores_input() {
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();
        let token = player.cancel_token();
        player.tick(&mut doc);

        token.cancel();

        assert_eq!(player.poll(&mut doc, Instant::now()), TickOutcome::Stopped);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(!doc.is_typing_suppressed());
    }

    #[test]
    fn test_poll_waits_for_tick_interval() {
        let interval = Duration::from_millis(80);
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            PlayerOptions {
                tick_interval: interval,
            },
        )
        .unwrap();
        let t0 = Instant::now();

        assert!(matches!(player.poll(&mut doc, t0), TickOutcome::Paused(_)));
        assert_eq!(player.next_deadline(t0), None);

        player.resume();
        assert_eq!(player.next_deadline(t0), Some(t0));
        assert_eq!(player.poll(&mut doc, t0), TickOutcome::Applied);
        assert_eq!(player.next_deadline(t0), Some(t0 + interval));
        assert_eq!(player.poll(&mut doc, t0 + Duration::from_millis(10)), TickOutcome::Idle);
        assert_eq!(player.poll(&mut doc, t0 + interval), TickOutcome::Applied);
    }

    #[test]
    fn test_start_at_breakpoint_shows_its_snapshot() {
        let data = two_breakpoints();
        let second = data.breakpoints[1].id.clone();
        let mut doc = RopeDocument::new("");

        let mut player =
            Player::start_at(Some(data.play_data()), Some(&mut doc), &second, PlayerOptions::default())
                .unwrap();
        assert_eq!(doc.text(), "ab");

        assert!(matches!(player.tick(&mut doc), TickOutcome::Paused(p) if p.label() == "2/2"));
        player.resume();
        player.tick(&mut doc);
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_start_at_unknown_breakpoint() {
        let mut doc = RopeDocument::new("");
        let result = Player::start_at(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            "missing",
            PlayerOptions::default(),
        );
        assert!(matches!(result, Err(PlaybackError::UnknownBreakpoint(id)) if id == "missing"));
        assert!(!doc.is_typing_suppressed());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut doc = RopeDocument::new("");
        let mut player = Player::start(
            Some(two_breakpoints().play_data()),
            Some(&mut doc),
            PlayerOptions::default(),
        )
        .unwrap();
        player.stop(&mut doc);
        player.stop(&mut doc);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.tick(&mut doc), TickOutcome::Stopped);
        assert!(!player.pause());
        assert!(!player.resume());
    }
}
