//! Observable update events emitted while a stream is reconstructed.

use chatrelay_models::EntryId;

/// One observable step of transcript reconstruction.
///
/// `Update` carries the full accumulator value, not a patch; across one
/// stream the carried contents grow by strict prefix-extension.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// The placeholder entry's content was replaced with the value so far.
    Update { entry: EntryId, content: String },
    /// The stream ended cleanly; the entry is frozen at this content.
    Completed { entry: EntryId, content: String },
    /// The stream failed; the placeholder was rolled back.
    Failed { message: String },
    /// The caller cancelled; the entry is frozen with partial content.
    Cancelled { entry: EntryId },
}
