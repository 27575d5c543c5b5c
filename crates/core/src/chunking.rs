use crate::extractor::PageText;
use crate::models::ChunkingOptions;

/// A chunk as produced by the splitter, before it has an identity or an
/// embedding. Page numbers are 1-based; chunk indices are global across
/// the whole document, assigned in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub content: String,
    pub page_number: u32,
    pub chunk_index: u64,
}

/// Splits per-page text into overlapping, boundary-snapped windows.
///
/// Each page is walked with a cursor: the naive window end is
/// `start + max_length`, and if that falls short of the page end we search
/// backward for a sentence terminator (then a whitespace boundary), but only
/// accept one inside the last 20% of the window. The cursor then backtracks
/// by `overlap` so a sentence split across a window edge still appears
/// intact in at least one chunk.
pub fn chunk_pages(pages: &[PageText], options: &ChunkingOptions) -> Vec<ChunkDraft> {
    let mut chunks = Vec::new();
    let mut next_index = 0u64;

    for page in pages {
        next_index = chunk_page(page, options, next_index, &mut chunks);
    }

    chunks
}

fn chunk_page(
    page: &PageText,
    options: &ChunkingOptions,
    mut next_index: u64,
    chunks: &mut Vec<ChunkDraft>,
) -> u64 {
    let chars: Vec<char> = page.text.chars().collect();
    if chars.is_empty() {
        return next_index;
    }

    let max_length = options.max_length.max(1);
    let mut start = 0usize;

    loop {
        let end = (start + max_length).min(chars.len());
        let actual_end = snap_to_boundary(&chars, start, end, max_length);

        let content: String = chars[start..actual_end].iter().collect();
        let content = content.trim();
        if !content.is_empty() {
            chunks.push(ChunkDraft {
                content: content.to_string(),
                page_number: page.number,
                chunk_index: next_index,
            });
            next_index += 1;
        }

        if actual_end == chars.len() {
            break;
        }

        // Backtrack by the overlap; the cursor must still move forward, so a
        // degenerate overlap (>= max_length) falls through to the window end.
        let next_start = actual_end.saturating_sub(options.overlap);
        start = if next_start > start { next_start } else { actual_end };
    }

    next_index
}

/// Finds the actual window end: a `.` or whitespace boundary at or before
/// `end`, accepted only if it lies within the last 20% of the window.
fn snap_to_boundary(chars: &[char], start: usize, end: usize, max_length: usize) -> usize {
    if end >= chars.len() {
        return chars.len();
    }

    let floor = start as f64 + max_length as f64 * 0.8;

    let last_period = chars[..=end].iter().rposition(|c| *c == '.');
    if let Some(position) = last_period {
        if position as f64 > floor {
            return position + 1;
        }
    }

    let last_space = chars[..=end].iter().rposition(|c| c.is_whitespace());
    if let Some(position) = last_space {
        if position as f64 > floor {
            return position + 1;
        }
    }

    end
}
