// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

/// Resolves `$NAME` / `${NAME}` references in an already-dequoted string
/// using `lookup`. Operates after `kv::tokenize`, which is why there is no
/// quote state here: `kv::tokenize` has already stripped real quoting and,
/// crucially, left a literal `\$` pair (rather than collapsing it) exactly
/// where substitution must be suppressed. Callers must skip calling this
/// at all for a value/key `kv::tokenize` flagged as `*_literal` (wholly
/// single-quoted), since single-quoted text never expands regardless of
/// what it contains.
///
/// An unresolved name (`lookup` returns `None`) is replaced with the empty
/// string, matching the behavior of a truly undefined binding. Malformed
/// expansions (`${` with no closing `}`) are passed through literally
/// rather than causing an error.
pub fn expand(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
  let chars: Vec<char> = value.chars().collect();
  let n = chars.len();
  let mut i = 0;
  let mut out = String::new();

  while i < n {
    let c = chars[i];

    if c == '\\' && i + 1 < n && chars[i + 1] == '$' {
      out.push('$');
      i += 2;
    } else if c == '$' {
      i += 1;
      if i < n && chars[i] == '{' {
        let brace_start = i;
        i += 1;
        let name_start = i;
        while i < n && chars[i] != '}' {
          i += 1;
        }
        if i < n {
          let name: String = chars[name_start..i].iter().collect();
          out.push_str(&lookup(&name).unwrap_or_default());
          i += 1;
        } else {
          out.push('$');
          out.push('{');
          i = brace_start + 1;
        }
      } else {
        let name_start = i;
        while i < n && (chars[i].is_alphanumeric() || chars[i] == '_') {
          i += 1;
        }
        if i > name_start {
          let name: String = chars[name_start..i].iter().collect();
          out.push_str(&lookup(&name).unwrap_or_default());
        } else {
          out.push('$');
        }
      }
    } else {
      out.push(c);
      i += 1;
    }
  }

  out
}
