// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use crate::error::{Error, Result};

/// A single whitespace-delimited token from a `LABEL`/`ENV`/`ARG` value,
/// with its quoting resolved and (for the `key=value` syntax) the split
/// point between key and value recorded.
struct Token {
  /// The token exactly as it appeared in the source, quotes and escapes
  /// included — used for error messages and to detect whole-segment
  /// single-quoting for expansion purposes.
  raw: String,
  /// The token with quote delimiters stripped and escapes resolved.
  resolved: String,
  /// Byte offset into `resolved` where an unquoted, unescaped `=` was
  /// found, if any.
  eq_pos: Option<usize>,
  /// Byte offset into `raw` matching `eq_pos`, used to slice the raw key
  /// and value segments for single-quote detection.
  eq_pos_raw: Option<usize>,
  /// Byte range of this token (including any quotes) in the original
  /// value string.
  start: usize,
  end: usize,
}

/// True if `raw` is a single, unbroken single-quoted run with nothing
/// else attached — the shape variable expansion must never look inside.
fn is_fully_single_quoted(raw: &str) -> bool {
  raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') && !raw[1..raw.len() - 1].contains('\'')
}

/// Scans `value` into whitespace-separated tokens, tracking quoting state
/// across `"`, `'`, and `\`. Only `\"` and `\\` collapse inside double
/// quotes; any other `\x` is left as a literal backslash followed by `x`.
/// Outside quotes, `\x` always collapses to a literal `x`, except `\$`,
/// which is left as a literal backslash-dollar pair for the variable
/// expander to interpret as a suppression marker. Single quotes take
/// everything literally.
fn scan_tokens(value: &str) -> Vec<Token> {
  let v: Vec<(usize, char)> = value.char_indices().collect();
  let n = v.len();
  let mut i = 0;
  let mut tokens = Vec::new();

  while i < n {
    if v[i].1.is_whitespace() {
      i += 1;
      continue;
    }

    let start = v[i].0;
    let mut raw = String::new();
    let mut resolved = String::new();
    let mut eq_pos = None;
    let mut eq_pos_raw = None;
    let mut quote: Option<char> = None;

    while i < n {
      let c = v[i].1;

      match quote {
        None => {
          if c.is_whitespace() {
            break;
          } else if c == '"' || c == '\'' {
            quote = Some(c);
            raw.push(c);
            i += 1;
          } else if c == '\\' && i + 1 < n && v[i + 1].1 == '$' {
            raw.push(c);
            raw.push('$');
            resolved.push(c);
            resolved.push('$');
            i += 2;
          } else if c == '\\' {
            raw.push(c);
            i += 1;
            if i < n {
              raw.push(v[i].1);
              resolved.push(v[i].1);
              i += 1;
            }
          } else if c == '=' && eq_pos.is_none() {
            eq_pos = Some(resolved.len());
            eq_pos_raw = Some(raw.len());
            raw.push(c);
            i += 1;
          } else {
            raw.push(c);
            resolved.push(c);
            i += 1;
          }
        }
        Some('"') => {
          if c == '"' {
            quote = None;
            raw.push(c);
            i += 1;
          } else if c == '\\' && i + 1 < n && (v[i + 1].1 == '"' || v[i + 1].1 == '\\') {
            raw.push(c);
            raw.push(v[i + 1].1);
            resolved.push(v[i + 1].1);
            i += 2;
          } else {
            raw.push(c);
            resolved.push(c);
            i += 1;
          }
        }
        Some('\'') => {
          if c == '\'' {
            quote = None;
            raw.push(c);
            i += 1;
          } else {
            raw.push(c);
            resolved.push(c);
            i += 1;
          }
        }
        _ => unreachable!(),
      }
    }

    let end = if i < n { v[i].0 } else { value.len() };
    tokens.push(Token { raw, resolved, eq_pos, eq_pos_raw, start, end });
  }

  tokens
}

/// Resolves quoting/escaping over a substring without splitting it into
/// tokens or collapsing whitespace — used to reconstruct the "old space
/// syntax" value, which keeps its original inter-word spacing.
fn dequote_verbatim(s: &str) -> String {
  let chars: Vec<char> = s.chars().collect();
  let n = chars.len();
  let mut i = 0;
  let mut out = String::new();
  let mut quote: Option<char> = None;

  while i < n {
    let c = chars[i];

    match quote {
      None => {
        if c == '"' || c == '\'' {
          quote = Some(c);
          i += 1;
        } else if c == '\\' && i + 1 < n && chars[i + 1] == '$' {
          out.push('\\');
          out.push('$');
          i += 2;
        } else if c == '\\' {
          i += 1;
          if i < n {
            out.push(chars[i]);
            i += 1;
          }
        } else {
          out.push(c);
          i += 1;
        }
      }
      Some('"') => {
        if c == '"' {
          quote = None;
          i += 1;
        } else if c == '\\' && i + 1 < n && (chars[i + 1] == '"' || chars[i + 1] == '\\') {
          out.push(chars[i + 1]);
          i += 2;
        } else {
          out.push(c);
          i += 1;
        }
      }
      Some('\'') => {
        if c == '\'' {
          quote = None;
          i += 1;
        } else {
          out.push(c);
          i += 1;
        }
      }
      _ => unreachable!(),
    }
  }

  out
}

/// One `(key, value)` pair recovered from a `LABEL`/`ENV`/`ARG` value,
/// plus whether each side was wholly wrapped in single quotes — the
/// variable expander must never substitute inside those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
  pub key: String,
  pub value: String,
  pub key_literal: bool,
  pub value_literal: bool,
  /// `false` only for the bare old-style `ARG name` form (no `=`, no
  /// trailing value at all); such a pair carries no value of its own and
  /// must fall back to an outer binding rather than defaulting to `""`.
  pub has_value: bool,
  /// `true` if this pair was written `key=value`, `false` if it was the
  /// legacy `key value` form — rewriting a pair must keep whichever
  /// separator the line originally used.
  pub has_equals: bool,
  /// The quote character wrapping the key in the source (`'"'` or `'\''`),
  /// if any — preserved verbatim when a pair is rewritten.
  pub key_quote: Option<char>,
}

/// Splits the `value` of a `LABEL`/`ENV`/`ARG` instruction into ordered
/// key/value pairs, per the mixed `key=value` / `key value` grammar.
pub fn tokenize(value: &str) -> Result<Vec<Pair>> {
  let tokens = scan_tokens(value);

  if tokens.is_empty() {
    return Ok(Vec::new());
  }

  let any_eq = tokens.iter().any(|t| t.eq_pos.is_some());

  if any_eq {
    let mut pairs = Vec::with_capacity(tokens.len());
    for t in &tokens {
      match t.eq_pos {
        Some(pos) => {
          let eq_raw = t.eq_pos_raw.expect("eq_pos implies eq_pos_raw");
          let key_raw = &t.raw[..eq_raw];
          let value_raw = &t.raw[eq_raw + 1..];
          pairs.push(Pair {
            key: t.resolved[..pos].to_string(),
            value: t.resolved[pos..].to_string(),
            key_literal: is_fully_single_quoted(key_raw),
            value_literal: is_fully_single_quoted(value_raw),
            has_value: true,
            has_equals: true,
            key_quote: key_raw.chars().next().filter(|c| *c == '"' || *c == '\''),
          });
        }
        None => return Err(Error::Syntax { token: t.raw.clone() }),
      }
    }
    Ok(pairs)
  } else {
    let key = tokens[0].resolved.clone();
    let key_literal = is_fully_single_quoted(&tokens[0].raw);
    let after_key = tokens[0].end;
    let rest_start = value[after_key..]
      .find(|c: char| !c.is_whitespace())
      .map(|off| after_key + off);

    let (val, value_literal) = match rest_start {
      Some(start) => {
        let rest = &value[start..];
        (dequote_verbatim(rest), is_fully_single_quoted(rest.trim_end()))
      }
      None => (String::new(), false),
    };

    let key_quote = tokens[0].raw.chars().next().filter(|c| *c == '"' || *c == '\'');

    Ok(vec![Pair {
      key,
      value: val,
      key_literal,
      value_literal,
      has_value: rest_start.is_some(),
      has_equals: false,
      key_quote,
    }])
  }
}

/// True if `s` needs quoting to round-trip safely as a bareword in a
/// `key=value` pair: it's empty, has whitespace/`=`/quote characters, or
/// falls outside printable ASCII.
fn needs_quote(s: &str) -> bool {
  s.is_empty()
    || s.chars().any(|c| {
      c.is_whitespace() || c == '=' || c == '"' || c == '\'' || !c.is_ascii() || c.is_ascii_control()
    })
}

/// Formats a single `key=value` pair for a freshly-inserted instruction
/// line, quoting the key or value only when needed to round-trip safely.
pub fn format_pair(key: &str, value: &str) -> String {
  format_pair_with_key_quote(key, None, value)
}

/// Formats a `key=value` pair, forcing the key to be wrapped in
/// `key_quote` (`'"'` or `'\''`) if given, regardless of whether it would
/// otherwise need it — used when rewriting an existing pair so its key
/// keeps its original quoting style.
pub fn format_pair_with_key_quote(key: &str, key_quote: Option<char>, value: &str) -> String {
  format_pair_with_separator(key, key_quote, value, true)
}

/// As [`format_pair_with_key_quote`], but also chooses the separator: `=`
/// when `has_equals`, a plain space when rewriting the legacy `key value`
/// form so an old-style line doesn't turn into `=` syntax on edit.
pub fn format_pair_with_separator(key: &str, key_quote: Option<char>, value: &str, has_equals: bool) -> String {
  let k = match key_quote {
    Some(q) => format!("{0}{1}{0}", q, key),
    None if needs_quote(key) => format!("\"{}\"", key),
    None => key.to_string(),
  };
  let sep = if has_equals { "=" } else { " " };
  format!("{}{}{}", k, sep, quote_value(value))
}

/// Quotes `value` only if needed. Prefers single quotes, but falls back
/// to double quotes (escaping `"` and `\`) when the value itself contains
/// a single quote, so the result always round-trips.
fn quote_value(value: &str) -> String {
  if !needs_quote(value) {
    return value.to_string();
  }
  if value.contains('\'') {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
  } else {
    format!("'{}'", value)
  }
}

/// Returns the quote character used for `key`'s token in `value` (`'"'` or
/// `'\''`), or `None` if it appeared unquoted. `None` is also returned if
/// `key` isn't present. Used to preserve a key's quoting style on rewrite.
pub fn key_quote_style(value: &str, key: &str) -> Option<char> {
  for t in scan_tokens(value) {
    if let Some(pos) = t.eq_pos {
      if t.resolved[..pos] == *key {
        let eq_raw = t.eq_pos_raw?;
        return t.raw[..eq_raw].chars().next().filter(|c| *c == '"' || *c == '\'');
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn pairs(value: &str) -> Vec<(String, String)> {
    tokenize(value).unwrap().into_iter().map(|p| (p.key, p.value)).collect()
  }

  #[test]
  fn new_syntax_basic_pairs() {
    assert_eq!(
      pairs(r#""name1"='value 1' "name2"=myself name3="""#),
      vec![
        ("name1".to_string(), "value 1".to_string()),
        ("name2".to_string(), "myself".to_string()),
        ("name3".to_string(), "".to_string()),
      ]
    );
    assert_eq!(pairs("name5=5"), vec![("name5".into(), "5".into())]);
    assert_eq!(pairs(r#""name6"=6"#), vec![("name6".into(), "6".into())]);
  }

  #[test]
  fn old_syntax_single_key() {
    assert_eq!(pairs("name7"), vec![("name7".into(), "".into())]);
    assert_eq!(pairs(r#""name8""#), vec![("name8".into(), "".into())]);
  }

  #[test]
  fn quoting_and_escapes() {
    assert_eq!(
      pairs(r#""name9"="asd \  \n qwe""#),
      vec![("name9".into(), "asd \\  \\n qwe".into())]
    );
    assert_eq!(pairs(r#""name1 1"=1"#), vec![("name1 1".into(), "1".into())]);
    assert_eq!(pairs(r"name14=1\ 4"), vec![("name14".into(), "1 4".into())]);
    assert_eq!(
      pairs(r#"name15="with = in value""#),
      vec![("name15".into(), "with = in value".into())]
    );
  }

  #[test]
  fn old_syntax_preserves_inner_whitespace() {
    assert_eq!(pairs("name101 101"), vec![("name101".into(), "101".into())]);
    assert_eq!(pairs("name102 1 02"), vec![("name102".into(), "1 02".into())]);
    assert_eq!(pairs(r#""name103" 1 03"#), vec![("name103".into(), "1 03".into())]);
    assert_eq!(pairs(r#"name104 "1"  04"#), vec![("name104".into(), "1  04".into())]);
    assert_eq!(pairs("name105 1 '05'"), vec![("name105".into(), "1 05".into())]);
    assert_eq!(pairs("name106 1 '0'   6"), vec![("name106".into(), "1 0   6".into())]);
    assert_eq!(pairs(r"name107 1 0\ 7"), vec![("name107".into(), "1 0 7".into())]);
    assert_eq!(
      pairs(r#"name109 "\"quoted\"""#),
      vec![("name109".into(), "\"quoted\"".into())]
    );
  }

  #[test]
  fn single_quoted_value_is_flagged_literal() {
    let p = tokenize("V='$X'").unwrap();
    assert_eq!(p.len(), 1);
    assert!(p[0].value_literal);
    assert_eq!(p[0].value, "$X");

    let p = tokenize("'$X'").unwrap();
    assert_eq!(p.len(), 1);
    assert!(p[0].value_literal);
    assert_eq!(p[0].value, "$X");

    let p = tokenize("V=$X").unwrap();
    assert!(!p[0].value_literal);
  }

  #[test]
  fn backslash_dollar_survives_tokenizing_for_the_expander() {
    let p = tokenize(r"V=\$X").unwrap();
    assert_eq!(p[0].value, "\\$X");
  }

  #[test]
  fn key_quote_style_round_trips() {
    let value = r#""ownership"="Alice's label" other=value"#;
    assert_eq!(key_quote_style(value, "ownership"), Some('"'));
    assert_eq!(key_quote_style(value, "other"), None);
    assert_eq!(key_quote_style(value, "missing"), None);
    assert_eq!(
      format_pair_with_key_quote("ownership", Some('"'), "Alice's label"),
      r#""ownership"="Alice's label""#
    );
  }

  #[test]
  fn mixed_syntax_is_a_syntax_error() {
    let err = tokenize("a=b c").unwrap_err();
    match err {
      Error::Syntax { token } => assert_eq!(token, "c"),
      other => panic!("expected Syntax error, got {:?}", other),
    }
  }

  #[test]
  fn format_pair_quotes_only_when_needed() {
    assert_eq!(format_pair("foo", "bar"), "foo=bar");
    assert_eq!(format_pair("foo", "has space"), "foo='has space'");
    assert_eq!(format_pair("foo", ""), "foo=''");
  }
}
