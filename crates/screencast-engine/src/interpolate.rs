//! Expansion of short typed insertions into per-character frames.
//!
//! A burst of characters that the editor reported as one insertion (fast
//! typing, autocompletion of a short word, a small paste) replays as if it
//! were typed one key at a time. Anything else, including pastes of
//! [`MAX_INTERPOLATED_LEN`] characters or more, replays in one step.

use crate::change::{Change, EditOp, Range, Selection};

/// Insertions this long or longer are stored as a single change.
pub const MAX_INTERPOLATED_LEN: usize = 50;

/// Whether `change` is a single-line, single-cursor plain insertion short
/// enough to replay as typing.
pub fn is_typing_burst(change: &Change) -> bool {
    let ([edit], [selection]) = (change.edits.as_slice(), change.selections.as_slice()) else {
        return false;
    };

    let len = edit.text.chars().count();
    len > 1
        && len < MAX_INTERPOLATED_LEN
        && edit.range.is_empty()
        && edit.range.is_single_line()
        && selection.is_empty()
        && selection.is_single_line()
        && !edit.text.contains(['\n', '\r'])
}

/// Split a typing burst into one change per character; any other change is
/// returned untouched as the only element.
pub fn interpolate(change: Change) -> Vec<Change> {
    if !is_typing_burst(&change) {
        return vec![change];
    }

    let edit = &change.edits[0];
    let selection = change.selections[0];
    let n = edit.text.chars().count();

    edit.text
        .chars()
        .enumerate()
        .map(|(i, ch)| {
            let at = edit.range.start.translate_right(i);
            let back = n - 1 - i;
            Change {
                edits: vec![EditOp {
                    range: Range::empty(at),
                    range_offset: edit.range_offset + i,
                    range_length: edit.range_length,
                    text: ch.to_string(),
                }],
                selections: vec![Selection::new(
                    selection.anchor.translate_left(back),
                    selection.active.translate_left(back),
                )],
            }
        })
        .collect()
}
