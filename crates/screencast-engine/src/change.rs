//! Atomic units recorded and replayed.
//!
//! Positions are `(line, character)` pairs where `character` counts Unicode
//! scalar values from the start of the line. Offsets and lengths carried by
//! [`EditOp`] use the same unit, counted from the start of the document.

/// A location in a text buffer.
///
/// Field order makes the derived `Ord` match document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }

    /// Same line, `n` characters further right
    pub fn translate_right(self, n: usize) -> Self {
        Self {
            line: self.line,
            character: self.character + n,
        }
    }

    /// Same line, `n` characters further left (clamped to column 0)
    pub fn translate_left(self, n: usize) -> Self {
        Self {
            line: self.line,
            character: self.character.saturating_sub(n),
        }
    }
}

/// Ordered pair of positions, `start <= end` in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Build a range from two positions in any order
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Collapsed range at `at`
    pub fn empty(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }
}

/// One atomic buffer mutation: delete `range` and insert `text` in its place.
///
/// `text == ""` is a pure deletion, `range_length == 0` a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EditOp {
    pub range: Range,
    pub range_offset: usize,
    pub range_length: usize,
    pub text: String,
}

impl EditOp {
    /// Pure insertion of `text` at `at`, which sits `offset` characters into the document
    pub fn insert(at: Position, offset: usize, text: impl Into<String>) -> Self {
        Self {
            range: Range::empty(at),
            range_offset: offset,
            range_length: 0,
            text: text.into(),
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.range_length == 0 && self.range.is_empty()
    }

    pub fn is_deletion(&self) -> bool {
        self.text.is_empty()
    }
}

/// A selection as the editor reports it: `anchor` is where it started,
/// `active` is where the caret is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Selection {
    pub anchor: Position,
    pub active: Position,
}

impl Selection {
    pub const fn new(anchor: Position, active: Position) -> Self {
        Self { anchor, active }
    }

    /// Empty selection (plain caret) at `at`
    pub const fn caret(at: Position) -> Self {
        Self {
            anchor: at,
            active: at,
        }
    }

    pub fn start(&self) -> Position {
        self.anchor.min(self.active)
    }

    pub fn end(&self) -> Position {
        self.anchor.max(self.active)
    }

    pub fn range(&self) -> Range {
        Range::new(self.anchor, self.active)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.active
    }

    pub fn is_single_line(&self) -> bool {
        self.anchor.line == self.active.line
    }
}

/// Everything that happened between two selection notifications: zero or
/// more edits followed by the resulting selection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Change {
    pub edits: Vec<EditOp>,
    pub selections: Vec<Selection>,
}

impl Change {
    pub fn new(edits: Vec<EditOp>, selections: Vec<Selection>) -> Self {
        Self { edits, selections }
    }

    /// A change with no edits, only a new selection state
    pub fn cursor_move(selections: Vec<Selection>) -> Self {
        Self {
            edits: Vec::new(),
            selections,
        }
    }

    pub fn is_cursor_move(&self) -> bool {
        self.edits.is_empty() && !self.selections.is_empty()
    }
}
