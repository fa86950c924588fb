// Anchor codec: opaque, edit-resilient position tokens.
//
// A token is a yrs sticky index ("the point adjacent to CRDT item X, in
// direction Y") in its v1 binary encoding, wrapped in standard base64 for
// transport. Tokens stay meaningful after concurrent insertions and
// deletions elsewhere in the document; nothing outside this module may
// parse them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Assoc, IndexedSequence, StickyIndex, TextRef, TransactionMut};

use redline_common::range::TextRange;
use redline_common::types::Anchor;

use crate::error::AnchorError;

/// Encode a sticky index into its transport-safe string form.
pub fn encode_token(index: &StickyIndex) -> String {
    STANDARD.encode(index.encode_v1())
}

/// Decode a transport token back into a position descriptor.
///
/// Fails safely on malformed or foreign input; callers treat failure as
/// "anchor unusable" rather than an error condition.
pub fn decode_token(token: &str) -> Result<StickyIndex, AnchorError> {
    let bytes = STANDARD.decode(token)?;
    Ok(StickyIndex::decode_v1(&bytes)?)
}

/// Convert a live selection range into a durable anchor.
///
/// The start token associates rightward and the end token leftward, so the
/// anchored span hugs its content: insertions at either boundary fall
/// outside the anchor while the anchored text itself stays covered.
///
/// Returns `None` when either offset cannot be anchored against the current
/// snapshot (out of bounds, or the document is not usable).
pub fn anchor_from_range(
    txn: &mut TransactionMut<'_>,
    text: &TextRef,
    range: TextRange,
) -> Option<Anchor> {
    let start = text.sticky_index(txn, range.from, Assoc::After)?;
    let end = text.sticky_index(txn, range.to, Assoc::Before)?;
    Some(Anchor { start: encode_token(&start), end: encode_token(&end) })
}
