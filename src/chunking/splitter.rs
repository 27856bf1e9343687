//! Overlapping window splitter.
//!
//! Windows are at most `chunk_size` characters. Each window after the first
//! starts exactly `chunk_overlap` characters before the previous one ended,
//! so dropping the overlap prefix from every chunk but the first rebuilds the
//! input. Cut points prefer, in order:
//! 1. A paragraph break (`"\n\n"`)
//! 2. A line break
//! 3. A space
//! 4. A hard cut at the size limit
//!
//! Separators stay at the end of the window they close. Only the back half
//! of a window is searched for a separator so chunks never shrink to a sliver.

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split `text` into overlapping windows. Lengths are in `char`s.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size - 1);

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let separators: Vec<Vec<char>> = SEPARATORS.iter().map(|s| s.chars().collect()).collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + chunk_size).min(len);
        if hard_end == len {
            chunks.push(chars[start..len].iter().collect());
            break;
        }

        let floor = (start + chunk_size / 2).max(start + overlap + 1);
        let end = find_break(&chars, &separators, start, floor, hard_end).unwrap_or(hard_end);

        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    chunks
}

/// Latest end position in `floor..=ceiling` that closes a separator,
/// trying separators in preference order.
fn find_break(
    chars: &[char],
    separators: &[Vec<char>],
    start: usize,
    floor: usize,
    ceiling: usize,
) -> Option<usize> {
    for sep in separators {
        let found = (floor..=ceiling)
            .rev()
            .find(|&end| end >= start + sep.len() && chars[end - sep.len()..end] == sep[..]);
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    fn assert_invariants(text: &str, size: usize, overlap: usize) {
        let chunks = split_text(text, size, overlap);
        for chunk in &chunks {
            let n = chunk.chars().count();
            assert!(n > 0 && n <= size, "chunk length {n} out of range");
        }
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].chars().collect();
                chars[chars.len() - overlap..].iter().collect()
            };
            let head: String = pair[1].chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(rebuild(&chunks, overlap), text);
    }

    #[test]
    fn test_empty_and_blank_yield_nothing() {
        assert!(split_text("", 1000, 100).is_empty());
        assert!(split_text("  \n\n \t", 1000, 100).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = split_text("print('hello')\n", 1000, 100);
        assert_eq!(chunks, vec!["print('hello')\n".to_string()]);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let para1 = "a".repeat(700);
        let para2 = "b".repeat(700);
        let text = format!("{para1}\n\n{para2}");
        let chunks = split_text(&text, 1000, 100);
        assert_eq!(chunks[0], format!("{para1}\n\n"));
        assert_invariants(&text, 1000, 100);
    }

    #[test]
    fn test_prefers_line_break_over_space() {
        let text = format!("{} {}\n{}", "x".repeat(600), "y".repeat(200), "z".repeat(600));
        let chunks = split_text(&text, 1000, 100);
        assert!(chunks[0].ends_with('\n'));
        assert_invariants(&text, 1000, 100);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "q".repeat(2500);
        let chunks = split_text(&text, 1000, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 700);
        assert_invariants(&text, 1000, 100);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "é".repeat(1500);
        let chunks = split_text(&text, 1000, 100);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_invariants(&text, 1000, 100);
    }

    #[test]
    fn test_deterministic() {
        let text = (0..400)
            .map(|i| format!("line {i} of some source file"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(split_text(&text, 1000, 100), split_text(&text, 1000, 100));
        assert_invariants(&text, 1000, 100);
    }

    #[test]
    fn test_invariants_over_mixed_inputs() {
        let mut seed = 0x2545_f491_u64;
        let alphabet = ['a', 'b', ' ', '\n', 'ß', '{', '}'];
        for len in [1usize, 99, 100, 101, 999, 1000, 1001, 1999, 4321] {
            let text: String = (0..len)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 7;
                    seed ^= seed << 17;
                    alphabet[(seed % alphabet.len() as u64) as usize]
                })
                .collect();
            if text.trim().is_empty() {
                continue;
            }
            assert_invariants(&text, 1000, 100);
            assert_invariants(&text, 50, 10);
        }
    }
}
