//! Document chunking
//!
//! Greedy overlapping windows snapped to sentence or paragraph boundaries
//! when one exists in the back half of the window. The next window start
//! always advances strictly forward, so chunking terminates for any input
//! and any `target >= 1, overlap < target`.

/// Round a byte index down to a char boundary
fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Round a byte index up to a char boundary
fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Split `text` into overlapping chunks of roughly `target` bytes.
///
/// Window ends snap to the last `.` or blank line inside the window when it
/// lies past the halfway mark, so chunks tend to end on sentence or
/// paragraph boundaries. Whitespace-only windows are dropped.
pub fn chunk_text(text: &str, target: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let len = text.len();
    let target = target.max(1);
    let overlap = overlap.min(target.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = floor_boundary(text, (start + target).min(len));
        if end <= start {
            end = ceil_boundary(text, start + 1);
        }

        if end < len {
            let window = &text[start..end];
            let half = window.len() / 2;

            let sentence = window.rfind('.').map(|p| p + 1);
            let paragraph = window.rfind("\n\n").map(|p| p + 2);
            if let Some(snap) = sentence.into_iter().chain(paragraph).max() {
                if snap >= half {
                    end = start + snap;
                }
            }
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= len {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = start + 1;
        }
        start = ceil_boundary(text, next);
    }

    chunks
}
