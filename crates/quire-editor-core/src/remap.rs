//! Offset remapping between two versions of a text.
//!
//! Given an offset into an old text, find the corresponding offset in a new
//! text by diffing the two. Used to keep remote cursors in place while the
//! local document changes underneath them.
//!
//! Offsets are character offsets (NOT byte offsets), counted after line
//! endings are normalized to `\n`.

use std::borrow::Cow;

use similar::{Algorithm, DiffTag, TextDiff};

/// Edit cost used by the efficiency cleanup: an equality shorter than this,
/// sandwiched between edits, costs more to keep than to fold into the edits.
const EDIT_COST: usize = 4;

/// Map `offset` in `old_text` to the corresponding offset in `new_text`.
///
/// The result is always within `[0, len(new_text)]`. Identical texts short
/// circuit without diffing. Pure and deterministic.
pub fn remap(old_text: &str, new_text: &str, offset: usize) -> usize {
    let old_text = normalize_line_endings(old_text);
    let new_text = normalize_line_endings(new_text);

    if old_text == new_text {
        return offset.min(old_text.chars().count());
    }

    let old_len = old_text.chars().count();
    let offset = offset.min(old_len);

    let mut segments = diff_segments(&old_text, &new_text);
    cleanup_efficiency(&mut segments);

    let new_len = new_text.chars().count();
    map_offset(&segments, offset).min(new_len)
}

/// Replace `\r\n` and lone `\r` with `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// A run of the diff, measured in characters.
///
/// Segments are kept normalized: no zero-length runs and no two runs of the
/// same kind next to each other, so equalities and edits alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    /// Text present in both versions.
    Equal(usize),
    /// Text removed from the old version and text added in the new one.
    Edit { deleted: usize, inserted: usize },
}

fn diff_segments(old_text: &str, new_text: &str) -> Vec<Segment> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(old_text, new_text);

    let mut segments = Vec::new();
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        let segment = match tag {
            DiffTag::Equal => Segment::Equal(old_range.len()),
            DiffTag::Delete => Segment::Edit {
                deleted: old_range.len(),
                inserted: 0,
            },
            DiffTag::Insert => Segment::Edit {
                deleted: 0,
                inserted: new_range.len(),
            },
            DiffTag::Replace => Segment::Edit {
                deleted: old_range.len(),
                inserted: new_range.len(),
            },
        };
        push_segment(&mut segments, segment);
    }
    segments
}

/// Append a segment, merging it into the previous one when they are the same kind.
fn push_segment(segments: &mut Vec<Segment>, segment: Segment) {
    match (segments.last_mut(), segment) {
        (_, Segment::Equal(0))
        | (
            _,
            Segment::Edit {
                deleted: 0,
                inserted: 0,
            },
        ) => {}
        (Some(Segment::Equal(len)), Segment::Equal(more)) => *len += more,
        (
            Some(Segment::Edit { deleted, inserted }),
            Segment::Edit {
                deleted: more_deleted,
                inserted: more_inserted,
            },
        ) => {
            *deleted += more_deleted;
            *inserted += more_inserted;
        }
        _ => segments.push(segment),
    }
}

/// Fold short equalities that sit between edits into a single larger edit.
///
/// A mid-keystroke diff tends to come out as several tiny edits separated by
/// one or two coincidentally matching characters. Mapping a cursor through
/// those produces jumpy results; a single coherent replacement does not.
fn cleanup_efficiency(segments: &mut Vec<Segment>) {
    loop {
        let foldable = (1..segments.len().saturating_sub(1)).find(|&i| {
            let (
                Segment::Edit {
                    deleted: pre_del,
                    inserted: pre_ins,
                },
                Segment::Equal(len),
                Segment::Edit {
                    deleted: post_del,
                    inserted: post_ins,
                },
            ) = (segments[i - 1], segments[i], segments[i + 1])
            else {
                return false;
            };
            let sides = [pre_del > 0, pre_ins > 0, post_del > 0, post_ins > 0];
            let present = sides.iter().filter(|s| **s).count();
            (len < EDIT_COST && present == 4) || (len < EDIT_COST / 2 && present == 3)
        });

        let Some(i) = foldable else {
            return;
        };

        let (mut deleted, mut inserted) = (0, 0);
        for segment in segments.drain(i - 1..=i + 1) {
            match segment {
                Segment::Equal(len) => {
                    deleted += len;
                    inserted += len;
                }
                Segment::Edit {
                    deleted: d,
                    inserted: n,
                } => {
                    deleted += d;
                    inserted += n;
                }
            }
        }
        segments.insert(i - 1, Segment::Edit { deleted, inserted });
    }
}

/// Walk the segments to find where `offset` (in the old text) lands in the new text.
///
/// An offset inside deleted text lands at the start of the replacement; an
/// offset right where text was inserted lands after the insertion.
fn map_offset(segments: &[Segment], offset: usize) -> usize {
    let mut old_pos = 0;
    let mut new_pos = 0;

    for segment in segments {
        match *segment {
            Segment::Equal(len) => {
                if offset < old_pos + len {
                    return new_pos + (offset - old_pos);
                }
                old_pos += len;
                new_pos += len;
            }
            Segment::Edit { deleted, inserted } => {
                if offset < old_pos + deleted {
                    return new_pos;
                }
                old_pos += deleted;
                new_pos += inserted;
            }
        }
    }

    new_pos + offset.saturating_sub(old_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_identity() {
        let text = "Hello, world!\nSecond line.";
        for k in 0..=text.chars().count() {
            assert_eq!(remap(text, text, k), k);
        }
    }

    #[test]
    fn test_identical_after_line_ending_normalization() {
        assert_eq!(remap("a\r\nb", "a\nb", 2), 2);
        assert_eq!(remap("a\rb", "a\nb", 3), 3);
    }

    #[test]
    fn test_result_is_always_in_range() {
        let old = "The quick brown fox";
        let new = "A slow fox";
        let new_len = new.chars().count();
        for k in [0, 1, 5, 10, 19, 20, 1_000, usize::MAX] {
            let mapped = remap(old, new, k);
            assert!(mapped <= new_len, "remap({k}) = {mapped} > {new_len}");
        }
        // Out-of-range offsets on identical text clamp too.
        assert_eq!(remap("abc", "abc", 99), 3);
        assert_eq!(remap("", "", 5), 0);
    }

    #[test]
    fn test_insertion_before_offset_shifts_it() {
        // Cursor sits before "world".
        assert_eq!(remap("Hello world", "Hello big world", 6), 10);
    }

    #[test]
    fn test_insertion_after_offset_leaves_it() {
        assert_eq!(remap("Hello world", "Hello world!!!", 5), 5);
    }

    #[test]
    fn test_deletion_spanning_offset_collapses_to_start() {
        // Cursor inside "XYZ" which gets deleted.
        assert_eq!(remap("abcXYZdef", "abcdef", 5), 3);
    }

    #[test]
    fn test_deletion_before_offset() {
        assert_eq!(remap("abcdef", "def", 4), 1);
    }

    #[test]
    fn test_offset_at_end_follows_end() {
        let old = "abc";
        let new = "xxabcyy";
        assert_eq!(remap(old, new, 3), 7);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Each emoji is one char but four bytes.
        assert_eq!(remap("😀b", "😀😀b", 1), 2);
        assert_eq!(remap("éé", "xéé", 2), 3);
    }

    #[test]
    fn test_crlf_offsets_use_normalized_text() {
        // "a\r\nb" normalizes to "a\nb"; offset 2 is before "b".
        assert_eq!(remap("a\r\nb", "a\nXb", 2), 3);
    }

    #[test]
    fn test_deterministic() {
        let old = "one two three four five";
        let new = "one 2 three 4 five six";
        let first = remap(old, new, 12);
        for _ in 0..10 {
            assert_eq!(remap(old, new, 12), first);
        }
    }

    #[test]
    fn test_cleanup_folds_short_equality_between_full_edits() {
        let mut segments = vec![
            Segment::Equal(5),
            Segment::Edit {
                deleted: 2,
                inserted: 3,
            },
            Segment::Equal(1),
            Segment::Edit {
                deleted: 1,
                inserted: 1,
            },
            Segment::Equal(10),
        ];
        cleanup_efficiency(&mut segments);
        assert_eq!(
            segments,
            vec![
                Segment::Equal(5),
                Segment::Edit {
                    deleted: 4,
                    inserted: 5,
                },
                Segment::Equal(10),
            ]
        );
    }

    #[test]
    fn test_cleanup_keeps_long_equalities() {
        let original = vec![
            Segment::Edit {
                deleted: 1,
                inserted: 1,
            },
            Segment::Equal(EDIT_COST),
            Segment::Edit {
                deleted: 1,
                inserted: 1,
            },
        ];
        let mut segments = original.clone();
        cleanup_efficiency(&mut segments);
        assert_eq!(segments, original);
    }

    #[test]
    fn test_cleanup_three_sided_needs_tiny_equality() {
        // Pure insert on the right: only three sides present.
        let mut two_wide = vec![
            Segment::Edit {
                deleted: 1,
                inserted: 1,
            },
            Segment::Equal(2),
            Segment::Edit {
                deleted: 0,
                inserted: 1,
            },
        ];
        let before = two_wide.clone();
        cleanup_efficiency(&mut two_wide);
        assert_eq!(two_wide, before);

        let mut one_wide = vec![
            Segment::Edit {
                deleted: 1,
                inserted: 1,
            },
            Segment::Equal(1),
            Segment::Edit {
                deleted: 0,
                inserted: 1,
            },
        ];
        cleanup_efficiency(&mut one_wide);
        assert_eq!(
            one_wide,
            vec![Segment::Edit {
                deleted: 2,
                inserted: 3,
            }]
        );
    }

    #[test]
    fn test_map_offset_through_segments() {
        let segments = vec![
            Segment::Equal(2),
            Segment::Edit {
                deleted: 3,
                inserted: 1,
            },
            Segment::Equal(4),
        ];
        assert_eq!(map_offset(&segments, 0), 0);
        assert_eq!(map_offset(&segments, 2), 2);
        assert_eq!(map_offset(&segments, 3), 2);
        assert_eq!(map_offset(&segments, 5), 3);
        assert_eq!(map_offset(&segments, 9), 7);
    }
}
