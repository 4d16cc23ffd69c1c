// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

/// Splits `content` into physical lines, each retaining its trailing `\n`
/// except possibly the last line of the file.
pub(crate) fn split_lines(content: &str) -> Vec<&str> {
  if content.is_empty() {
    return Vec::new();
  }

  let mut lines = Vec::new();
  let mut start = 0;

  for (i, c) in content.char_indices() {
    if c == '\n' {
      lines.push(&content[start..=i]);
      start = i + 1;
    }
  }

  if start < content.len() {
    lines.push(&content[start..]);
  }

  lines
}

/// A physical line's content with its trailing newline (if any) removed.
pub(crate) fn strip_newline(line: &str) -> &str {
  line.strip_suffix('\n').unwrap_or(line)
}
