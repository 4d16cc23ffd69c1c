// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{COMMENT_INSTRUCTION, DEFAULT_ESCAPE_CHAR};
use crate::util::{split_lines, strip_newline};

lazy_static! {
  static ref SYNTAX_DIRECTIVE: Regex = Regex::new(r"(?i)^syntax\s*=").unwrap();
  static ref ESCAPE_DIRECTIVE: Regex = Regex::new(r"(?i)^escape\s*=\s*(\S)").unwrap();
}

/// One logical instruction or comment, located by its 0-based inclusive
/// physical-line range.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StructureItem {
  pub instruction: String,
  pub startline: usize,
  pub endline: usize,
  pub content: String,
  pub value: String,
}

impl StructureItem {
  pub fn is_comment(&self) -> bool {
    self.instruction == COMMENT_INSTRUCTION
  }
}

/// Text of a comment line (which still carries a leading `#` and any
/// indentation before it) after the `#` is stripped and the remainder is
/// left-trimmed. Trailing and internal whitespace is preserved verbatim.
fn comment_value(text: &str) -> String {
  match text.find('#') {
    Some(idx) => text[idx + 1..].trim_start().to_string(),
    None => text.trim_start().to_string(),
  }
}

/// Splits a line's leading whitespace-delimited token (the instruction
/// keyword) from the rest of the line. The remainder is returned as-is,
/// with no whitespace stripped.
fn split_keyword(text: &str) -> (String, &str) {
  let start = text.find(|c: char| !c.is_whitespace()).unwrap_or(text.len());
  let rest = &text[start..];
  let end = rest.find(char::is_whitespace).map(|i| start + i).unwrap_or(text.len());

  (text[start..end].to_uppercase(), &text[end..])
}

/// Scans leading comment lines for a `# syntax=...` / `# escape=X`
/// directive preamble. A `syntax` directive is transparent and does not
/// block a following `escape` directive. Any other comment permanently
/// blocks the escape directive for the rest of the file, even though it
/// would otherwise be found further down.
pub fn detect_escape(content: &str) -> char {
  for raw in split_lines(content) {
    let text = strip_newline(raw);
    let trimmed = text.trim_start();

    if trimmed.is_empty() || !trimmed.starts_with('#') {
      break;
    }

    let value = comment_value(text);

    if SYNTAX_DIRECTIVE.is_match(&value) {
      continue;
    }

    if let Some(caps) = ESCAPE_DIRECTIVE.captures(&value) {
      let ch = caps[1].chars().next().unwrap();
      if ch == '\\' || ch == '`' {
        return ch;
      }
    }

    break;
  }

  DEFAULT_ESCAPE_CHAR
}

/// Splits Dockerfile `content` into its logical instruction/comment
/// structure, resolving line continuations using `escape` as the active
/// escape character.
///
/// A comment that interrupts a continuation is recorded as its own
/// `StructureItem` at the point it is encountered, which places it earlier
/// in the returned list than the instruction it interrupts even though its
/// `startline` is numerically larger. This matches the upstream parser's
/// behavior and is intentional, not a bug.
pub fn scan(content: &str, escape: char) -> Vec<StructureItem> {
  let lines = split_lines(content);
  let mut items = Vec::new();
  let mut i = 0;

  while i < lines.len() {
    let raw = lines[i];
    let text = strip_newline(raw);

    if text.trim_start().is_empty() {
      i += 1;
      continue;
    }

    if text.trim_start().starts_with('#') {
      items.push(StructureItem {
        instruction: COMMENT_INSTRUCTION.to_string(),
        startline: i,
        endline: i,
        content: raw.to_string(),
        value: comment_value(text),
      });
      i += 1;
      continue;
    }

    let startline = i;
    let (keyword, remainder) = split_keyword(text);
    let mut fragments = Vec::new();
    let mut contents = String::new();
    contents.push_str(raw);

    let mut current = text;
    let mut value_source = remainder;
    let mut endline = i;

    loop {
      let continues = current.ends_with(escape);
      // The escape char that makes `current` continue isn't necessarily
      // inside `value_source` — a keyword-only line like `FROM\` has an
      // empty remainder, so only strip it when it's actually there.
      let frag = if continues && value_source.ends_with(escape) {
        &value_source[..value_source.len() - escape.len_utf8()]
      } else {
        value_source
      };
      fragments.push(frag.to_string());

      if !continues {
        break;
      }

      i += 1;
      while i < lines.len() {
        let next_raw = lines[i];
        let next_text = strip_newline(next_raw);
        if next_text.trim_start().starts_with('#') {
          items.push(StructureItem {
            instruction: COMMENT_INSTRUCTION.to_string(),
            startline: i,
            endline: i,
            content: next_raw.to_string(),
            value: comment_value(next_text),
          });
          i += 1;
          continue;
        }
        break;
      }

      if i >= lines.len() {
        break;
      }

      endline = i;
      contents.push_str(lines[i]);
      current = strip_newline(lines[i]);
      value_source = current;
    }

    items.push(StructureItem {
      instruction: keyword,
      startline,
      endline,
      content: contents,
      value: fragments.concat().trim().to_string(),
    });

    i += 1;
  }

  items
}

#[cfg(test)]
mod tests {
  use super::*;
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  fn item(instruction: &str, startline: usize, endline: usize, content: &str, value: &str) -> StructureItem {
    StructureItem {
      instruction: instruction.to_string(),
      startline,
      endline,
      content: content.to_string(),
      value: value.to_string(),
    }
  }

  #[test]
  fn structure_matches_reference_fixture() {
    let content = concat!(
      "# comment\n",
      " From  \\\n",
      "   base\n",
      " #    another   comment\n",
      " label  foo  \\\n",
      "# interrupt LABEL\n",
      "    bar  \n",
      "USER  someuser\n",
      "# comment \\\n",
      "# with \\ \n",
      "# backslashes \\\\ \n",
      "#no space after hash\n",
      "# comment # with hash inside\n",
      "RUN command1\n",
      "RUN command2 && \\\n",
      "    command3\n",
      "RUN command4 && \\\n",
      "# interrupt RUN\n",
      "    command5\n",
    );

    let structure = scan(content, '\\');

    assert_eq!(
      structure,
      vec![
        item(COMMENT_INSTRUCTION, 0, 0, "# comment\n", "comment"),
        item("FROM", 1, 2, " From  \\\n   base\n", "base"),
        item(COMMENT_INSTRUCTION, 3, 3, " #    another   comment\n", "another   comment"),
        item(COMMENT_INSTRUCTION, 5, 5, "# interrupt LABEL\n", "interrupt LABEL"),
        item("LABEL", 4, 6, " label  foo  \\\n    bar  \n", "foo      bar"),
        item("USER", 7, 7, "USER  someuser\n", "someuser"),
        item(COMMENT_INSTRUCTION, 8, 8, "# comment \\\n", "comment \\"),
        item(COMMENT_INSTRUCTION, 9, 9, "# with \\ \n", "with \\ "),
        item(COMMENT_INSTRUCTION, 10, 10, "# backslashes \\\\ \n", "backslashes \\\\ "),
        item(COMMENT_INSTRUCTION, 11, 11, "#no space after hash\n", "no space after hash"),
        item(COMMENT_INSTRUCTION, 12, 12, "# comment # with hash inside\n", "comment # with hash inside"),
        item("RUN", 13, 13, "RUN command1\n", "command1"),
        item("RUN", 14, 15, "RUN command2 && \\\n    command3\n", "command2 &&     command3"),
        item(COMMENT_INSTRUCTION, 17, 17, "# interrupt RUN\n", "interrupt RUN"),
        item("RUN", 16, 18, "RUN command4 && \\\n    command5\n", "command4 &&     command5"),
      ]
    );
  }

  #[test]
  fn invalid_keyword_is_preserved_verbatim() {
    let content = indoc! {"
      RUN apt-get update
          apt-get install something
    "};

    assert_eq!(
      scan(content, '\\'),
      vec![
        item("RUN", 0, 0, "RUN apt-get update\n", "apt-get update"),
        item("APT-GET", 1, 1, "    apt-get install something\n", "install something"),
      ]
    );
  }

  #[test]
  fn keyword_only_line_ending_in_escape_does_not_panic() {
    // "FROM\" has no whitespace at all, so the whole token (escape char
    // included) is the keyword and the remainder is empty; continuing
    // onto the next line must not underflow when slicing that remainder.
    let content = "FROM\\\nbase\n";
    let structure = scan(content, '\\');

    assert_eq!(structure.len(), 1);
    assert_eq!(structure[0].startline, 0);
    assert_eq!(structure[0].endline, 1);
    assert_eq!(structure[0].value, "base");
  }

  #[test]
  fn detect_escape_default() {
    assert_eq!(detect_escape("FROM base\n"), '\\');
  }

  #[test]
  fn detect_escape_directive() {
    let content = "#    escape=   `\nFROM base\n";
    assert_eq!(detect_escape(content), '`');
  }

  #[test]
  fn detect_escape_after_syntax_directive() {
    let content = "# syntax=ubuntu\n#    escape=   `\nFROM base\n";
    assert_eq!(detect_escape(content), '`');
  }

  #[test]
  fn detect_escape_blocked_by_other_comment() {
    let content = "# comment\n# escape=`\nFROM base\n";
    assert_eq!(detect_escape(content), '\\');
  }
}
