// Anchor resolution: durable anchor → current absolute offsets.
//
// Called on every document change for every live entity, so it must be
// pure, cheap and side-effect-free. Failures never propagate: an anchor
// that cannot be resolved marks its entity as orphaned (hidden, not
// deleted).

use tracing::warn;
use yrs::ReadTxn;

use redline_common::range::TextRange;
use redline_common::types::Anchor;

use crate::anchor::decode_token;

/// Resolve an anchor against the current document state.
///
/// Returns `None` when either token fails to decode, either position no
/// longer maps into the document, or the anchored content has collapsed to
/// zero width. The returned range is normalized so `from <= to`.
pub fn resolve_anchor<T: ReadTxn>(txn: &T, anchor: &Anchor) -> Option<TextRange> {
    let start = match decode_token(&anchor.start) {
        Ok(index) => index,
        Err(error) => {
            warn!(%error, "unusable anchor start token");
            return None;
        }
    };
    let end = match decode_token(&anchor.end) {
        Ok(index) => index,
        Err(error) => {
            warn!(%error, "unusable anchor end token");
            return None;
        }
    };

    let start_abs = start.get_offset(txn)?.index;
    let end_abs = end.get_offset(txn)?.index;
    if start_abs == end_abs {
        return None;
    }

    Some(TextRange::new(start_abs, end_abs))
}
