// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use std::convert::TryInto;

/// An offset used to adjust proceeding Spans after content has been spliced.
#[derive(Debug)]
struct SpliceOffset {
  position: usize,
  offset: isize,
}

/// A byte-index range of characters in a string.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

impl Span {
  pub fn new(start: usize, end: usize) -> Span {
    Span { start, end }
  }

  fn adjust_offsets(&self, offsets: &[SpliceOffset]) -> Span {
    let mut start = self.start as isize;
    let mut end = self.end as isize;

    for splice in offsets {
      if splice.position < start as usize {
        start += splice.offset;
        end += splice.offset;
      } else if splice.position < end as usize {
        end += splice.offset;
      }
    }

    Span {
      start: start.try_into().ok().unwrap_or(0),
      end: end.try_into().ok().unwrap_or(0),
    }
  }
}

/// Applies a sequence of replacements to a string, keeping byte spans of
/// not-yet-spliced regions valid across earlier splices.
pub struct Splicer {
  pub content: String,

  splice_offsets: Vec<SpliceOffset>,
}

impl Splicer {
  pub fn new(content: impl Into<String>) -> Splicer {
    Splicer {
      content: content.into(),
      splice_offsets: Vec::new(),
    }
  }

  /// Replaces the bytes covered by `span` (as originally recorded, before
  /// any splices so far) with `replacement`.
  pub fn splice(&mut self, span: &Span, replacement: &str) {
    let span = span.adjust_offsets(&self.splice_offsets);

    let prev_len = span.end - span.start;
    let new_len = replacement.len();
    let offset = new_len as isize - prev_len as isize;
    self.splice_offsets.push(SpliceOffset { position: span.start, offset });

    let (beginning, rest) = self.content.split_at(span.start);
    let (_, end) = rest.split_at(span.end - span.start);
    self.content = format!("{}{}{}", beginning, replacement, end);
  }

  /// Inserts `text` at byte offset `at` without removing anything.
  pub fn insert(&mut self, at: usize, text: &str) {
    self.splice(&Span::new(at, at), text);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splice_single() {
    let mut s = Splicer::new("hello world");
    s.splice(&Span::new(0, 5), "goodbye");
    assert_eq!(s.content, "goodbye world");
  }

  #[test]
  fn splice_multiple_adjusts_offsets() {
    let mut s = Splicer::new("aaa bbb ccc");
    s.splice(&Span::new(0, 3), "x");
    s.splice(&Span::new(8, 11), "y");
    assert_eq!(s.content, "x bbb y");
  }

  #[test]
  fn insert_at_point() {
    let mut s = Splicer::new("ab");
    s.insert(1, "-");
    assert_eq!(s.content, "a-b");
  }
}
