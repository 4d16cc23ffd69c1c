// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use std::path::Path;

use indexmap::IndexMap;

use crate::context::{self, Context, Kind};
use crate::error::{Error, Result};
use crate::image;
use crate::kv;
use crate::scanner::{self, StructureItem};
use crate::splicer::{Span, Splicer};
use crate::store::{ContentStore, ReadWriteSeek};
use crate::util;

/// Where a structural edit is targeted.
pub enum Anchor<'a> {
  /// A physical line index; must be some instruction's `startline`.
  Line(usize),
  /// The exact `content` of some instruction; must match exactly one.
  Content(&'a str),
  /// An instruction record already in hand (e.g. from [`DockerfileParser::structure`]).
  Item(&'a StructureItem),
}

fn resolve_anchor(structure: &[StructureItem], anchor: &Anchor) -> Result<StructureItem> {
  match anchor {
    Anchor::Line(idx) => structure
      .iter()
      .find(|it| it.startline == *idx)
      .cloned()
      .ok_or_else(|| Error::Invariant { message: format!("no instruction starts at line {}", idx) }),
    Anchor::Content(text) => {
      let matches: Vec<&StructureItem> = structure.iter().filter(|it| it.content == *text).collect();
      match matches.len() {
        1 => Ok(matches[0].clone()),
        0 => Err(Error::Invariant { message: "no instruction matches the given anchor text".into() }),
        n => Err(Error::Invariant {
          message: format!("anchor text matches {} instructions, expected exactly one", n),
        }),
      }
    }
    Anchor::Item(item) => Ok((*item).clone()),
  }
}

/// Options for [`DockerfileParser::add_lines_at`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddLinesAtOptions {
  /// Replace the anchor's full physical range instead of inserting
  /// alongside it.
  pub replace: bool,
  /// Insert after the anchor's block (respecting continuations) instead
  /// of before it. Ignored when `replace` is set.
  pub after: bool,
}

/// Options for [`DockerfileParser::add_lines`].
#[derive(Debug, Clone, Copy)]
pub struct AddLinesOptions {
  /// Insert into every stage, not just the last.
  pub all_stages: bool,
  /// Insert immediately after each stage's `FROM` rather than at the end
  /// of the stage.
  pub at_start: bool,
  /// Skip stages whose (expanded) `FROM` resolves to `scratch`.
  pub skip_scratch: bool,
}

impl Default for AddLinesOptions {
  fn default() -> Self {
    AddLinesOptions { all_stages: true, at_start: false, skip_scratch: false }
  }
}

/// Byte ranges, inclusive-start/exclusive-end, of each physical line in
/// `content`, indexed by line number.
fn line_offsets(content: &str) -> Vec<(usize, usize)> {
  let mut offsets = Vec::new();
  let mut start = 0;

  for line in util::split_lines(content) {
    offsets.push((start, start + line.len()));
    start += line.len();
  }

  offsets
}

/// Rebuilds a single-line instruction (collapsing any continuation) as
/// `<original keyword text, case and indentation preserved> <new_value>\n`.
fn rewritten_line(original: &str, new_value: &str) -> String {
  let indent_len = original.len() - original.trim_start().len();
  let prefix = &original[..indent_len];
  let after_indent = &original[indent_len..];
  let kw_end = after_indent.find(char::is_whitespace).unwrap_or(after_indent.len());
  let keyword_text = &after_indent[..kw_end];
  format!("{}{} {}\n", prefix, keyword_text, new_value)
}

/// Re-attaches a ` AS alias` suffix, if any, to `image`.
fn attach_alias(image: &str, alias: Option<&str>) -> String {
  match alias {
    Some(a) => format!("{} AS {}", image, a),
    None => image.to_string(),
  }
}

/// A handle onto a Dockerfile's text, with accessors and rewriters
/// derived from its parsed structure.
///
/// ```
/// use dockerfile_edit::DockerfileParser;
///
/// let df = DockerfileParser::from_str("FROM alpine:3.11\nCMD [\"sh\"]\n");
/// assert_eq!(df.baseimage().unwrap(), Some("alpine:3.11".to_string()));
/// assert_eq!(df.basetag().unwrap(), Some("3.11".to_string()));
/// ```
pub struct DockerfileParser {
  store: ContentStore,
  env_replace: bool,
  parent_env: IndexMap<String, String>,
  build_args: IndexMap<String, String>,
}

impl DockerfileParser {
  fn new(store: ContentStore) -> Self {
    DockerfileParser { store, env_replace: true, parent_env: IndexMap::new(), build_args: IndexMap::new() }
  }

  /// Opens `path`, re-reading it from disk on every access.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::new(ContentStore::path(path, false)))
  }

  /// Opens `path`, reading it once and keeping subsequent reads/writes in
  /// memory.
  pub fn open_cached(path: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::new(ContentStore::path(path, true)))
  }

  /// Wraps an in-memory buffer. Infallible: there is no I/O to fail.
  pub fn from_str(content: impl Into<String>) -> Self {
    Self::new(ContentStore::memory(content))
  }

  /// Wraps a caller-supplied seekable stream.
  pub fn from_reader<R: ReadWriteSeek + 'static>(reader: R) -> Self {
    Self::new(ContentStore::reader(reader))
  }

  pub fn with_env_replace(mut self, env_replace: bool) -> Self {
    self.env_replace = env_replace;
    self
  }

  pub fn with_parent_env(mut self, parent_env: IndexMap<String, String>) -> Self {
    self.parent_env = parent_env;
    self
  }

  pub fn with_build_args(mut self, build_args: IndexMap<String, String>) -> Self {
    self.build_args = build_args;
    self
  }

  /// The raw Dockerfile text.
  pub fn content(&self) -> Result<String> {
    self.store.content()
  }

  /// Replaces the entire Dockerfile text.
  pub fn set_content(&mut self, content: impl Into<String>) -> Result<()> {
    self.store.set_content(&content.into())
  }

  /// The Dockerfile as physical lines, each keeping its trailing newline.
  pub fn lines(&self) -> Result<Vec<String>> {
    let content = self.content()?;
    Ok(util::split_lines(&content).into_iter().map(str::to_string).collect())
  }

  /// Replaces the Dockerfile text with the concatenation of `lines`.
  pub fn set_lines(&mut self, lines: &[String]) -> Result<()> {
    self.set_content(lines.concat())
  }

  /// The parsed instruction/comment structure, in scan order.
  pub fn structure(&self) -> Result<Vec<StructureItem>> {
    let content = self.content()?;
    let escape = scanner::detect_escape(&content);
    Ok(scanner::scan(&content, escape))
  }

  /// One [`Context`] per non-comment entry of [`Self::structure`].
  pub fn context_structure(&self) -> Result<Vec<Context>> {
    let structure = self.structure()?;
    context::build(&structure, self.env_replace, &self.parent_env, &self.build_args)
  }

  fn from_entries(&self) -> Result<Vec<(StructureItem, String)>> {
    let structure = self.structure()?;
    let ctx = self.context_structure()?;
    Ok(structure
      .iter()
      .filter(|it| !it.is_comment())
      .zip(ctx.iter())
      .filter(|(it, _)| it.instruction == "FROM")
      .filter_map(|(it, c)| c.from_value().map(|v| (it.clone(), v.to_string())))
      .collect())
  }

  /// All `FROM` image references, in source order, across every stage.
  /// Blank `FROM` lines are skipped.
  pub fn parent_images(&self) -> Result<Vec<String>> {
    let froms = self.from_entries()?;
    Ok(
      froms
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .filter_map(|(_, v)| image::image_from(v).0)
        .collect(),
    )
  }

  /// True if the file declares two or more non-blank `FROM` stages.
  pub fn is_multistage(&self) -> Result<bool> {
    Ok(self.parent_images()?.len() >= 2)
  }

  /// The last stage's base image, stripped of any ` AS <alias>` suffix.
  pub fn baseimage(&self) -> Result<Option<String>> {
    let froms = self.from_entries()?;
    Ok(froms.last().and_then(|(_, v)| image::image_from(v).0))
  }

  /// The `:tag` portion of the last stage's base image, if any.
  pub fn basetag(&self) -> Result<Option<String>> {
    let froms = self.from_entries()?;
    Ok(froms.last().and_then(|(_, v)| image::tag_from(v).1))
  }

  /// The raw value of the last stage's last `CMD`, if any.
  pub fn cmd(&self) -> Result<Option<String>> {
    let structure = self.structure()?;
    let last_from_start =
      structure.iter().filter(|it| !it.is_comment() && it.instruction == "FROM").map(|it| it.startline).last();

    Ok(
      structure
        .iter()
        .filter(|it| !it.is_comment() && it.instruction == "CMD")
        .filter(|it| last_from_start.map_or(true, |s| it.startline > s))
        .last()
        .map(|it| it.value.clone()),
    )
  }

  /// Merged `LABEL` bindings of the last stage.
  pub fn labels(&self) -> Result<IndexMap<String, String>> {
    let ctx = self.context_structure()?;
    Ok(ctx.last().map(|c| c.get_values(Kind::Label).clone()).unwrap_or_default())
  }

  /// Merged `ENV` bindings of the last stage.
  pub fn envs(&self) -> Result<IndexMap<String, String>> {
    let ctx = self.context_structure()?;
    Ok(ctx.last().map(|c| c.get_values(Kind::Env).clone()).unwrap_or_default())
  }

  /// Merged `ARG` bindings of the last stage (`ARG`s declared only before
  /// the first `FROM` are not part of any stage and are excluded).
  pub fn args(&self) -> Result<IndexMap<String, String>> {
    let ctx = self.context_structure()?;
    Ok(ctx.last().map(|c| c.get_values(Kind::Arg).clone()).unwrap_or_default())
  }

  /// The whole structure as a JSON array of single-key objects, in
  /// `structure` order; comments appear as `{"COMMENT": text}`.
  pub fn json(&self) -> Result<serde_json::Value> {
    let structure = self.structure()?;
    let entries: Vec<serde_json::Value> = structure
      .iter()
      .map(|it| {
        let mut obj = serde_json::Map::with_capacity(1);
        obj.insert(it.instruction.clone(), serde_json::Value::String(it.value.clone()));
        serde_json::Value::Object(obj)
      })
      .collect();
    Ok(serde_json::Value::Array(entries))
  }

  fn set_kv_kind(&mut self, kind: &str, new_values: &IndexMap<String, String>) -> Result<()> {
    let structure = self.structure()?;
    let content = self.content()?;
    let offsets = line_offsets(&content);

    let last_from_start =
      structure.iter().filter(|it| !it.is_comment() && it.instruction == "FROM").map(|it| it.startline).last();

    let existing: Vec<&StructureItem> = structure
      .iter()
      .filter(|it| !it.is_comment() && it.instruction == kind)
      .filter(|it| last_from_start.map_or(true, |s| it.startline > s))
      .collect();

    let mut remaining = new_values.clone();
    let mut splicer = Splicer::new(content.clone());

    for item in &existing {
      let pairs = kv::tokenize(&item.value)?;
      let mut rendered = Vec::new();

      for p in &pairs {
        if let Some(v) = remaining.shift_remove(&p.key) {
          rendered.push(kv::format_pair_with_separator(&p.key, p.key_quote, &v, p.has_equals));
        }
      }

      let span = Span::new(offsets[item.startline].0, offsets[item.endline].1);
      if rendered.is_empty() {
        splicer.splice(&span, "");
      } else {
        splicer.splice(&span, &format!("{} {}\n", kind, rendered.join(" ")));
      }
    }

    if !remaining.is_empty() {
      let new_line = format!("{} {}\n", kind, remaining.iter().map(|(k, v)| kv::format_pair(k, v)).collect::<Vec<_>>().join(" "));

      let insert_at = match existing.last() {
        Some(item) => offsets[item.endline].1,
        None => match last_from_start {
          Some(start_line) => {
            let from_item = structure
              .iter()
              .filter(|it| !it.is_comment() && it.instruction == "FROM" && it.startline == start_line)
              .last()
              .expect("last_from_start came from an existing FROM item");
            offsets[from_item.endline].1
          }
          None => content.len(),
        },
      };

      splicer.insert(insert_at, &new_line);
    }

    self.set_content(splicer.content)
  }

  pub fn set_labels(&mut self, values: &IndexMap<String, String>) -> Result<()> {
    self.set_kv_kind("LABEL", values)
  }

  pub fn set_envs(&mut self, values: &IndexMap<String, String>) -> Result<()> {
    self.set_kv_kind("ENV", values)
  }

  pub fn set_args(&mut self, values: &IndexMap<String, String>) -> Result<()> {
    self.set_kv_kind("ARG", values)
  }

  fn delete_kv_kind(&mut self, kind: &str, key: &str) -> Result<()> {
    let mut current = match kind {
      "LABEL" => self.labels()?,
      "ENV" => self.envs()?,
      "ARG" => self.args()?,
      other => return Err(Error::InvalidArgument { message: format!("not a key/value instruction: {}", other) }),
    };

    if current.shift_remove(key).is_none() {
      return Err(Error::NotFound { key: key.to_string() });
    }

    self.set_kv_kind(kind, &current)
  }

  pub fn delete_label(&mut self, key: &str) -> Result<()> {
    self.delete_kv_kind("LABEL", key)
  }

  pub fn delete_env(&mut self, key: &str) -> Result<()> {
    self.delete_kv_kind("ENV", key)
  }

  pub fn delete_arg(&mut self, key: &str) -> Result<()> {
    self.delete_kv_kind("ARG", key)
  }

  fn last_from_item(&self) -> Result<StructureItem> {
    let structure = self.structure()?;
    structure
      .into_iter()
      .filter(|it| !it.is_comment() && it.instruction == "FROM")
      .last()
      .ok_or_else(|| Error::Invariant { message: "Dockerfile has no FROM instruction".into() })
  }

  /// Rewrites `item`'s full physical span to a single line keeping the
  /// source's original keyword text (case and leading indentation) with
  /// `new_value` as its payload. Used by the single-value setters, which
  /// touch only the line they target.
  fn rewrite_single_value(&mut self, item: &StructureItem, new_value: &str) -> Result<()> {
    let content = self.content()?;
    let offsets = line_offsets(&content);
    let span = Span::new(offsets[item.startline].0, offsets[item.endline].1);
    let new_line = rewritten_line(&content[span.start..span.end], new_value);

    let mut splicer = Splicer::new(content.clone());
    splicer.splice(&span, &new_line);
    self.set_content(splicer.content)
  }

  /// The last stage's base image, including any tag. Fails if the file has
  /// no `FROM` instruction; the ` AS alias` suffix of the existing `FROM`,
  /// if any, is preserved.
  pub fn set_baseimage(&mut self, image: &str) -> Result<()> {
    let last_from = self.last_from_item()?;
    let (_, alias) = image::image_from(&last_from.value);
    let new_value = attach_alias(image, alias.as_deref());
    self.rewrite_single_value(&last_from, &new_value)
  }

  /// Replaces the `:tag` of the last stage's base image, keeping the image
  /// name and any ` AS alias` suffix intact.
  pub fn set_basetag(&mut self, tag: &str) -> Result<()> {
    let last_from = self.last_from_item()?;
    let (_, alias) = image::image_from(&last_from.value);
    let (base, _old_tag) = image::tag_from(&last_from.value);
    let retagged = image::tag_to(&base.unwrap_or_default(), Some(tag));
    let new_value = attach_alias(&retagged, alias.as_deref());
    self.rewrite_single_value(&last_from, &new_value)
  }

  /// Replaces every non-blank `FROM` image reference, in source order,
  /// preserving each stage's ` AS alias` suffix and leaving blank `FROM`
  /// lines untouched. Fails if `images` doesn't have exactly one entry per
  /// non-blank `FROM`.
  pub fn set_parent_images(&mut self, images: &[String]) -> Result<()> {
    let structure = self.structure()?;
    let from_items: Vec<StructureItem> = structure
      .into_iter()
      .filter(|it| !it.is_comment() && it.instruction == "FROM" && !it.value.trim().is_empty())
      .collect();

    if from_items.len() != images.len() {
      return Err(Error::Invariant {
        message: format!(
          "expected {} parent image(s) to match existing FROM instructions, got {}",
          from_items.len(),
          images.len()
        ),
      });
    }

    let content = self.content()?;
    let offsets = line_offsets(&content);
    let mut splicer = Splicer::new(content.clone());

    for (item, new_image) in from_items.iter().zip(images.iter()) {
      let (_, alias) = image::image_from(&item.value);
      let new_value = attach_alias(new_image, alias.as_deref());
      let span = Span::new(offsets[item.startline].0, offsets[item.endline].1);
      let new_line = rewritten_line(&content[span.start..span.end], &new_value);
      splicer.splice(&span, &new_line);
    }

    self.set_content(splicer.content)
  }

  /// Sets the last stage's `CMD`, rewriting an existing one in place or
  /// appending a new `CMD` line at the end of the file if the last stage
  /// doesn't have one.
  pub fn set_cmd(&mut self, value: &str) -> Result<()> {
    let structure = self.structure()?;
    let last_from_start =
      structure.iter().filter(|it| !it.is_comment() && it.instruction == "FROM").map(|it| it.startline).last();

    let existing = structure
      .iter()
      .filter(|it| !it.is_comment() && it.instruction == "CMD")
      .filter(|it| last_from_start.map_or(true, |s| it.startline > s))
      .last()
      .cloned();

    match existing {
      Some(item) => self.rewrite_single_value(&item, value),
      None => self.add_instruction("CMD", value),
    }
  }

  /// Appends a new, unconditional `keyword value` instruction at the end
  /// of the file. This is a low-level building block for instructions like
  /// `FROM`/`CMD` whose single value isn't a `LABEL`/`ENV`/`ARG` pair list;
  /// see [`Self::add_instruction_pair`] for those.
  pub fn add_instruction(&mut self, keyword: &str, value: &str) -> Result<()> {
    let content = self.content()?;
    let mut insertion = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
      insertion.push('\n');
    }
    insertion.push_str(&format!("{} {}\n", keyword.to_uppercase(), value));

    let mut splicer = Splicer::new(content.clone());
    splicer.insert(content.len(), &insertion);
    self.set_content(splicer.content)
  }

  /// Appends a new `keyword key=value` instruction (for `LABEL`/`ENV`/`ARG`)
  /// at the end of the file, quoting `key`/`value` only as needed.
  pub fn add_instruction_pair(&mut self, keyword: &str, key: &str, value: &str) -> Result<()> {
    self.add_instruction(keyword, &kv::format_pair(key, value))
  }

  /// Deletes every instruction matching `keyword`, or (if `token` is given)
  /// only those whose single value equals `token` exactly. A `token` that
  /// matches nothing is a no-op, not an error.
  pub fn delete_instructions(&mut self, keyword: &str, token: Option<&str>) -> Result<()> {
    let structure = self.structure()?;
    let keyword = keyword.to_uppercase();
    let targets: Vec<&StructureItem> = structure
      .iter()
      .filter(|it| !it.is_comment() && it.instruction == keyword)
      .filter(|it| token.map_or(true, |t| it.value == t))
      .collect();

    if targets.is_empty() {
      return Ok(());
    }

    let content = self.content()?;
    let offsets = line_offsets(&content);
    let mut splicer = Splicer::new(content.clone());

    for item in targets {
      let span = Span::new(offsets[item.startline].0, offsets[item.endline].1);
      splicer.splice(&span, "");
    }

    self.set_content(splicer.content)
  }

  /// Inserts, replaces, or appends `text` relative to `anchor`.
  pub fn add_lines_at(&mut self, anchor: Anchor, text: &str, opts: AddLinesAtOptions) -> Result<()> {
    let structure = self.structure()?;
    let content = self.content()?;
    let offsets = line_offsets(&content);
    let target = resolve_anchor(&structure, &anchor)?;

    let mut insertion = text.to_string();
    if !insertion.ends_with('\n') {
      insertion.push('\n');
    }

    let mut splicer = Splicer::new(content.clone());

    if opts.replace {
      let span = Span::new(offsets[target.startline].0, offsets[target.endline].1);
      splicer.splice(&span, &insertion);
    } else if opts.after {
      let at = offsets[target.endline].1;
      let mut combined = String::new();
      if at == content.len() && !content.is_empty() && !content.ends_with('\n') {
        combined.push('\n');
      }
      combined.push_str(&insertion);
      splicer.insert(at, &combined);
    } else {
      let at = offsets[target.startline].0;
      splicer.insert(at, &insertion);
    }

    self.set_content(splicer.content)
  }

  /// Inserts `text` into one or more stages per `opts`.
  pub fn add_lines(&mut self, text: &str, opts: AddLinesOptions) -> Result<()> {
    let structure = self.structure()?;
    let content = self.content()?;
    let offsets = line_offsets(&content);

    let mut insertion = text.to_string();
    if !insertion.ends_with('\n') {
      insertion.push('\n');
    }

    if !opts.all_stages {
      let mut combined = String::new();
      if !content.is_empty() && !content.ends_with('\n') {
        combined.push('\n');
      }
      combined.push_str(&insertion);
      let mut splicer = Splicer::new(content.clone());
      splicer.insert(content.len(), &combined);
      return self.set_content(splicer.content);
    }

    let froms = self.from_entries()?;
    let mut splicer = Splicer::new(content.clone());

    for (i, (from_item, from_value)) in froms.iter().enumerate() {
      if opts.skip_scratch {
        let (image, _alias) = image::image_from(from_value);
        if image.as_deref().unwrap_or("").eq_ignore_ascii_case("scratch") {
          continue;
        }
      }

      if opts.at_start {
        splicer.insert(offsets[from_item.endline].1, &insertion);
      } else {
        let stage_end = match froms.get(i + 1) {
          Some((next_from, _)) => offsets[next_from.startline].0,
          None => content.len(),
        };

        let mut combined = String::new();
        if stage_end == content.len() && !content.is_empty() && !content.ends_with('\n') {
          combined.push('\n');
        }
        combined.push_str(&insertion);
        splicer.insert(stage_end, &combined);
      }
    }

    let _ = structure;
    self.set_content(splicer.content)
  }
}
