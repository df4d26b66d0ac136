//! In-memory editor backed by an xi-rope buffer.
//!
//! `RopeDocument` is the reference [`DocumentHost`]: playback applies
//! recorded changes to it, and local typing through
//! [`RopeDocument::replace_selection`] and friends yields the same
//! [`EditOp`]s a real editor would report, ready for the recorder.

use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::change::{EditOp, Position, Range, Selection};
use crate::error::HostError;
use crate::host::DocumentHost;
use crate::project::{PlayData, PlayFrame};

/// Caret movements supported by [`RopeDocument::move_caret`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
    LineStart,
    LineEnd,
}

#[derive(Debug, Clone)]
pub struct RopeDocument {
    /// Whole document as UTF-8
    buffer: Rope,
    selections: Vec<Selection>,
    revealed: Option<Range>,
    typing_suppressed: bool,
    focused: bool,
    /// Incremented on every buffer change
    version: u64,
}

impl RopeDocument {
    pub fn new(text: &str) -> Self {
        Self {
            buffer: Rope::from(text),
            selections: vec![Selection::caret(Position::default())],
            revealed: None,
            typing_suppressed: false,
            focused: false,
            version: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::new(text))
    }

    /// The document a complete replay of `play` ends with, caret included.
    /// Frames that fail to apply are skipped, as during playback.
    pub fn from_play_data(play: &PlayData) -> Self {
        let mut doc = Self::new(&play.initial_content);
        for frame in &play.frames {
            let PlayFrame::Change(change) = frame else {
                continue;
            };
            if !change.edits.is_empty()
                && let Err(e) = doc.apply_edits(&change.edits)
            {
                log::debug!("replay skipped edits: {e}");
            }
            if !change.selections.is_empty()
                && let Err(e) = doc.set_selections(&change.selections)
            {
                log::debug!("replay skipped selections: {e}");
            }
        }
        doc.version = 0;
        doc
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn primary_selection(&self) -> Selection {
        self.selections
            .first()
            .copied()
            .unwrap_or(Selection::caret(Position::default()))
    }

    pub fn revealed_range(&self) -> Option<Range> {
        self.revealed
    }

    pub fn is_typing_suppressed(&self) -> bool {
        self.typing_suppressed
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn line_count(&self) -> usize {
        self.buffer.line_of_offset(self.buffer.len()) + 1
    }

    /// Text of `line` without its line ending
    pub fn line(&self, line: usize) -> Option<String> {
        let (start, end) = self.line_span(line)?;
        Some(self.buffer.slice_to_cow(start..end).into_owned())
    }

    fn line_len(&self, line: usize) -> usize {
        self.line(line).map(|l| l.chars().count()).unwrap_or(0)
    }

    /// Byte span of `line`, excluding `\n` or `\r\n`
    fn line_span(&self, line: usize) -> Option<(usize, usize)> {
        let count = self.line_count();
        if line >= count {
            return None;
        }
        let start = self.buffer.offset_of_line(line);
        let next = if line + 1 < count {
            self.buffer.offset_of_line(line + 1)
        } else {
            self.buffer.len()
        };
        let raw = self.buffer.slice_to_cow(start..next);
        let content = raw.strip_suffix('\n').unwrap_or(&raw);
        let content = content.strip_suffix('\r').unwrap_or(content);
        Some((start, start + content.len()))
    }

    /// Byte offset of `pos` in the buffer
    pub fn offset_of(&self, pos: Position) -> Result<usize, HostError> {
        let (start, end) = self
            .line_span(pos.line)
            .ok_or(HostError::PositionOutOfBounds(pos))?;
        let line = self.buffer.slice_to_cow(start..end);
        let mut chars = line.char_indices().map(|(i, _)| i).chain([line.len()]);
        chars
            .nth(pos.character)
            .map(|i| start + i)
            .ok_or(HostError::PositionOutOfBounds(pos))
    }

    /// Position of byte `offset`, clamped to the end of the buffer
    pub fn position_of(&self, offset: usize) -> Position {
        let offset = offset.min(self.buffer.len());
        let line = self.buffer.line_of_offset(offset);
        let start = self.buffer.offset_of_line(line);
        Position {
            line,
            character: self.buffer.slice_to_cow(start..offset).chars().count(),
        }
    }

    /// Characters between the start of the document and `pos`
    pub fn char_offset_of(&self, pos: Position) -> Result<usize, HostError> {
        let offset = self.offset_of(pos)?;
        Ok(self.buffer.slice_to_cow(0..offset).chars().count())
    }

    /// Type `text` over the primary selection, leaving the caret after it.
    /// Returns the edit as an editor would report it.
    pub fn replace_selection(&mut self, text: &str) -> Result<EditOp, HostError> {
        let range = self.primary_selection().range();
        let start = self.offset_of(range.start)?;
        let end = self.offset_of(range.end)?;

        let edit = EditOp {
            range,
            range_offset: self.buffer.slice_to_cow(0..start).chars().count(),
            range_length: self.buffer.slice_to_cow(start..end).chars().count(),
            text: text.to_string(),
        };
        self.apply_edits(std::slice::from_ref(&edit))?;
        self.selections = vec![Selection::caret(self.position_of(start + text.len()))];
        Ok(edit)
    }

    /// Backspace: delete the selection, or the character (or line break)
    /// before the caret. `None` at the start of the document.
    pub fn delete_backward(&mut self) -> Result<Option<EditOp>, HostError> {
        let selection = self.primary_selection();
        if selection.is_empty() {
            let caret = selection.active;
            let offset = self.offset_of(caret)?;
            let Some(previous) = self.previous_boundary(offset) else {
                return Ok(None);
            };
            self.selections = vec![Selection::new(self.position_of(previous), caret)];
        }
        self.replace_selection("").map(Some)
    }

    fn previous_boundary(&self, offset: usize) -> Option<usize> {
        if offset == 0 {
            return None;
        }
        let line = self.buffer.line_of_offset(offset);
        let line_start = self.buffer.offset_of_line(line);
        if offset == line_start {
            // Join with the previous line, swallowing `\r\n` whole
            return self.line_span(line - 1).map(|(_, end)| end);
        }
        let before = self.buffer.slice_to_cow(line_start..offset);
        before.chars().next_back().map(|c| offset - c.len_utf8())
    }

    /// Move the primary caret, collapsing any selection
    pub fn move_caret(&mut self, motion: Motion) -> Selection {
        let Position { line, character } = self.primary_selection().active;
        let last_line = self.line_count() - 1;

        let target = match motion {
            Motion::Left if character > 0 => Position::new(line, character - 1),
            Motion::Left if line > 0 => Position::new(line - 1, self.line_len(line - 1)),
            Motion::Right if character < self.line_len(line) => Position::new(line, character + 1),
            Motion::Right if line < last_line => Position::new(line + 1, 0),
            Motion::Up if line > 0 => {
                Position::new(line - 1, character.min(self.line_len(line - 1)))
            }
            Motion::Down if line < last_line => {
                Position::new(line + 1, character.min(self.line_len(line + 1)))
            }
            Motion::LineStart => Position::new(line, 0),
            Motion::LineEnd => Position::new(line, self.line_len(line)),
            _ => Position::new(line, character),
        };

        let selection = Selection::caret(target);
        self.selections = vec![selection];
        selection
    }
}

impl Default for RopeDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl DocumentHost for RopeDocument {
    fn apply_edits(&mut self, edits: &[EditOp]) -> Result<(), HostError> {
        if edits.is_empty() {
            return Ok(());
        }

        let mut spans = edits
            .iter()
            .map(|edit| {
                Ok((
                    self.offset_of(edit.range.start)?,
                    self.offset_of(edit.range.end)?,
                    edit.text.as_str(),
                ))
            })
            .collect::<Result<Vec<_>, HostError>>()?;
        // Stable, so insertions at the same point keep their reported order
        spans.sort_by_key(|(start, end, _)| (*start, *end));
        if spans.windows(2).any(|pair| pair[0].1 > pair[1].0) {
            return Err(HostError::OverlappingEdits);
        }

        let mut builder = Builder::new(self.buffer.len());
        for (start, end, text) in spans {
            builder.replace(start..end, Rope::from(text));
        }
        self.buffer = builder.build().apply(&self.buffer);
        self.version += 1;
        Ok(())
    }

    fn set_selections(&mut self, selections: &[Selection]) -> Result<(), HostError> {
        for selection in selections {
            for pos in [selection.anchor, selection.active] {
                self.offset_of(pos).map_err(|_| {
                    HostError::ApplySelection(format!(
                        "{}:{} is outside the document",
                        pos.line, pos.character
                    ))
                })?;
            }
        }
        self.selections = selections.to_vec();
        Ok(())
    }

    fn reveal_range(&mut self, range: Range) {
        self.revealed = Some(range);
    }

    fn full_text(&self) -> String {
        self.text()
    }

    fn replace_all_text(&mut self, text: &str) -> Result<(), HostError> {
        self.buffer = Rope::from(text);
        self.selections = vec![Selection::caret(Position::default())];
        self.version += 1;
        Ok(())
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn suppress_typing_input(&mut self) {
        self.typing_suppressed = true;
    }

    fn restore_typing_input(&mut self) {
        self.typing_suppressed = false;
    }
}
