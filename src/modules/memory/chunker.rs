use std::collections::VecDeque;
use std::ops::Range;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk of the source text together with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub offset: usize,
    pub text: String,
}

/// Recursive character splitter: paragraphs first, then lines, then words,
/// then single characters, merged back into windows of at most `chunk_size`
/// characters that overlap by up to `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        self.split_range(text, 0..text.len(), &SEPARATORS)
            .into_iter()
            .filter_map(|range| trimmed(text, range))
            .collect()
    }

    fn split_range(&self, text: &str, range: Range<usize>, separators: &[&str]) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let idx = separators
            .iter()
            .position(|sep| sep.is_empty() || slice.contains(sep))
            .unwrap_or(separators.len() - 1);
        let separator = separators[idx];
        let finer = &separators[idx + 1..];

        let mut out = Vec::new();
        let mut fitting = Vec::new();
        for piece in pieces(slice, range.start, separator) {
            if char_len(text, &piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(text, &fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_range(text, piece, finer));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(text, &fitting));
        }
        out
    }

    /// Pieces are contiguous, so a window is simply `first.start..last.end`.
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        let mut current: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(text, piece);
            if total + len > self.chunk_size && !current.is_empty() {
                windows.push(window(&current));
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, popped)) => total -= popped,
                        None => break,
                    }
                }
            }
            current.push_back((piece.clone(), len));
            total += len;
        }
        if !current.is_empty() {
            windows.push(window(&current));
        }
        windows
    }
}

fn window(current: &VecDeque<(Range<usize>, usize)>) -> Range<usize> {
    let start = current.front().map(|(r, _)| r.start).unwrap_or(0);
    let end = current.back().map(|(r, _)| r.end).unwrap_or(start);
    start..end
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Splits keeping each separator at the start of the following piece.
fn pieces(slice: &str, base: usize, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }
    let mut out = Vec::new();
    let mut start = 0;
    for (i, _) in slice.match_indices(separator) {
        if i > start {
            out.push(base + start..base + i);
            start = i;
        }
    }
    if start < slice.len() {
        out.push(base + start..base + slice.len());
    }
    out
}

fn trimmed(text: &str, range: Range<usize>) -> Option<TextSpan> {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let body = slice.trim();
    if body.is_empty() {
        return None;
    }
    Some(TextSpan {
        offset: range.start + lead,
        text: body.to_string(),
    })
}
