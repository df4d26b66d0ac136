use crate::change::{EditOp, Range, Selection};
use crate::error::HostError;

/// The editor surface the engine records from and replays into.
///
/// Edits in one `apply_edits` call are all expressed against the document
/// as it was before the call, in the order the editor reported them.
pub trait DocumentHost {
    fn apply_edits(&mut self, edits: &[EditOp]) -> Result<(), HostError>;

    fn set_selections(&mut self, selections: &[Selection]) -> Result<(), HostError>;

    /// Scroll so that `range` is visible
    fn reveal_range(&mut self, range: Range);

    fn full_text(&self) -> String;

    fn replace_all_text(&mut self, text: &str) -> Result<(), HostError>;

    fn focus(&mut self);

    /// Ignore live keystrokes until [`DocumentHost::restore_typing_input`]
    fn suppress_typing_input(&mut self);

    fn restore_typing_input(&mut self);
}
