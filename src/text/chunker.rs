//! Script chunking for provider input limits
//!
//! Providers cap the text accepted per request. This module splits long
//! scripts into ordered windows of at most `max_chars` characters, cutting at
//! whitespace so words stay whole and never inside a markup token (`<tag …>`
//! or a bracketed cue like `[whispering]`).

/// Default chunk size limit, in characters
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// Longest span still treated as one markup token
const MAX_MARKUP_CHARS: usize = 256;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// When `max_chars` is 0, [`DEFAULT_MAX_CHARS`] is used. Text that already
/// fits is returned unchanged as a single chunk; otherwise every chunk is
/// trimmed and non-empty.
///
/// # Examples
///
/// ```
/// use script_narrator::text::chunk;
///
/// assert_eq!(chunk("short", 100), vec!["short"]);
/// assert_eq!(chunk("one two three", 8), vec!["one two", "three"]);
/// ```
#[must_use]
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = if max_chars == 0 {
        DEFAULT_MAX_CHARS
    } else {
        max_chars
    };

    // Byte offset of every char, plus the end of the text
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    if total <= max_chars {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let markup = markup_mask(&chars);
    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < total {
        // Leading whitespace would otherwise count against the window
        while pos < total && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos == total {
            break;
        }

        let end = (pos + max_chars).min(total);
        let cut = if end < total {
            find_cut(&chars, &markup, pos, end).unwrap_or(end)
        } else {
            end
        };

        let piece = text[offsets[pos]..offsets[cut]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        pos = cut;
    }

    tracing::debug!(chars = total, max_chars, chunks = chunks.len(), "script chunked");
    chunks
}

/// Flag every char inside a closed `<…>` tag or `[…]` cue
///
/// An opener counts only when its closer follows on the same line within
/// [`MAX_MARKUP_CHARS`]. A stray `<` or `[` is plain text.
fn markup_mask(chars: &[char]) -> Vec<bool> {
    let mut mask = vec![false; chars.len()];

    for (i, &open) in chars.iter().enumerate() {
        let close = match open {
            '<' => '>',
            '[' => ']',
            _ => continue,
        };
        let limit = (i + MAX_MARKUP_CHARS).min(chars.len());
        let closed_at = chars[i + 1..limit]
            .iter()
            .take_while(|&&c| c != '\n' && c != open)
            .position(|&c| c == close);

        if let Some(offset) = closed_at {
            mask[i..=i + 1 + offset].fill(true);
        }
    }

    mask
}

/// Last whitespace in `chars[pos..end]`, strictly after `pos`
///
/// Whitespace outside markup wins. A window that is all markup falls back to
/// any whitespace so a word is still never split.
fn find_cut(chars: &[char], markup: &[bool], pos: usize, end: usize) -> Option<usize> {
    let mut spaces = (pos + 1..end).rev().filter(|&i| chars[i].is_whitespace());
    let last = spaces.clone().next()?;
    Some(spaces.find(|&i| !markup[i]).unwrap_or(last))
}
