// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
  static ref VALID_TAG: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").unwrap();
}

/// Splits `text` (the value of a `FROM` instruction) into the image
/// reference token and an optional build-stage alias, on the first
/// whitespace-bounded `AS` (case-insensitive). Anything past the alias
/// token is ignored.
fn split_as(text: &str) -> (Option<String>, Option<String>) {
  let tokens: Vec<&str> = text.split_whitespace().collect();

  match tokens.as_slice() {
    [] => (None, None),
    [image] => (Some((*image).to_string()), None),
    [image, as_kw, alias, ..] if as_kw.eq_ignore_ascii_case("as") => {
      (Some((*image).to_string()), Some((*alias).to_string()))
    }
    [image, ..] => (Some((*image).to_string()), None),
  }
}

/// Splits an image reference at the last colon that appears after the
/// last slash, so registry ports (`host:5000/...`) are not mistaken for
/// a tag separator.
fn split_tag(image: &str) -> (String, Option<String>) {
  let last_slash = image.rfind('/');
  let search_from = last_slash.map(|i| i + 1).unwrap_or(0);

  match image[search_from..].rfind(':') {
    Some(rel) => {
      let idx = search_from + rel;
      (image[..idx].to_string(), Some(image[idx + 1..].to_string()))
    }
    None => (image.to_string(), None),
  }
}

/// Splits a `FROM` instruction value into `(image, alias)`, where `image`
/// keeps any tag it had. Everything after the alias is ignored; blank
/// input yields `(None, None)`.
pub fn image_from(text: &str) -> (Option<String>, Option<String>) {
  split_as(text)
}

/// Splits a `FROM` instruction value into `(image_without_tag, tag)`,
/// discarding any trailing `AS alias` first.
pub fn tag_from(text: &str) -> (Option<String>, Option<String>) {
  let (base, _alias) = split_as(text);
  match base {
    None => (None, None),
    Some(base) => {
      let (image, tag) = split_tag(&base);
      (Some(image), tag)
    }
  }
}

/// Re-attaches `tag` to `image`, replacing any tag `image` already has.
/// A blank tag yields the bare image (with its old tag, if any, removed
/// only when a blank tag is explicitly supplied and the image itself is
/// also blank).
pub fn tag_to(image: &str, tag: Option<&str>) -> String {
  let image = image.trim();
  let tag = tag.map(str::trim).unwrap_or("");

  if tag.is_empty() {
    return image.to_string();
  }

  let (base, _old_tag) = split_tag(image);
  format!("{}:{}", base, tag)
}

/// True if `s` matches Docker's tag-name grammar: starts with an
/// alphanumeric or underscore, followed by any number of alphanumerics,
/// underscores, dots, or dashes.
pub fn valid_tag(s: &str) -> bool {
  VALID_TAG.is_match(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_image_from() {
    assert_eq!(image_from("    "), (None, None));
    assert_eq!(image_from("   foo"), (Some("foo".into()), None));
    assert_eq!(
      image_from("foo:bar as baz   "),
      (Some("foo:bar".into()), Some("baz".into()))
    );
    assert_eq!(image_from("foo as baz"), (Some("foo".into()), Some("baz".into())));
    assert_eq!(image_from("foo and some other junk"), (Some("foo".into()), None));
    assert_eq!(
      image_from("registry.example.com:5000/foo/bar:baz"),
      (Some("registry.example.com:5000/foo/bar:baz".into()), None)
    );
  }

  #[test]
  fn test_tag_from() {
    assert_eq!(tag_from(""), (None, None));
    assert_eq!(tag_from("    "), (None, None));
    assert_eq!(tag_from("   foo"), (Some("foo".into()), None));
    assert_eq!(tag_from("foo:bar as baz   "), (Some("foo".into()), Some("bar".into())));
    assert_eq!(tag_from("foo as baz"), (Some("foo".into()), None));
    assert_eq!(tag_from("foo and some other junk"), (Some("foo".into()), None));
    assert_eq!(
      tag_from("registry.example.com:5000/foo/bar"),
      (Some("registry.example.com:5000/foo/bar".into()), None)
    );
    assert_eq!(
      tag_from("registry.example.com:5000/foo/bar:baz"),
      (Some("registry.example.com:5000/foo/bar".into()), Some("baz".into()))
    );
    assert_eq!(
      tag_from("localhost:5000/foo/bar:baz"),
      (Some("localhost:5000/foo/bar".into()), Some("baz".into()))
    );
  }

  #[test]
  fn test_tag_to() {
    assert_eq!(tag_to("    ", Some(" ")), "");
    assert_eq!(tag_to("foo", None), "foo");
    assert_eq!(tag_to("foo", Some("bar")), "foo:bar");
    assert_eq!(tag_to("foo", Some("")), "foo");
    assert_eq!(tag_to("foo:bar", Some("baz")), "foo:baz");
    assert_eq!(
      tag_to("registry.example.com:5000/foo/bar", Some("baz")),
      "registry.example.com:5000/foo/bar:baz"
    );
    assert_eq!(
      tag_to("localhost:5000/foo/bar", Some("baz")),
      "localhost:5000/foo/bar:baz"
    );
    assert_eq!(
      tag_to("nonvalid1@%registry.example.com:5000/foo/bar", Some("baz")),
      "nonvalid1@%registry.example.com:5000/foo/bar:baz"
    );
    assert_eq!(
      tag_to("registry.example.com:5000/foo/bar:baz", Some("bap")),
      "registry.example.com:5000/foo/bar:bap"
    );
  }

  #[test]
  fn test_valid_tag() {
    assert!(valid_tag("Tag"));
    assert!(valid_tag("tAg."));
    assert!(valid_tag("tag-tag"));
    assert!(!valid_tag(".notTag"));
    assert!(!valid_tag("not/tag"));
  }
}
