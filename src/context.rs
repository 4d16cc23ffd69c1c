// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use indexmap::IndexMap;

use crate::error::Result;
use crate::expand;
use crate::image;
use crate::kv;
use crate::scanner::StructureItem;

/// The three binding families tracked per stage. Kept as a closed enum
/// rather than a runtime string so an unrecognized kind cannot reach this
/// layer at all — the "unknown kind" error case from the original API is
/// unrepresentable here instead of checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  Arg,
  Env,
  Label,
}

impl Kind {
  pub(crate) fn instruction(&self) -> &'static str {
    match self {
      Kind::Arg => "ARG",
      Kind::Env => "ENV",
      Kind::Label => "LABEL",
    }
  }
}

/// A per-line snapshot: the bindings this line itself defines, and the
/// cumulative bindings of each kind visible at this point in the stage.
#[derive(Debug, Clone, Default)]
pub struct Context {
  line_arg: IndexMap<String, String>,
  line_env: IndexMap<String, String>,
  line_label: IndexMap<String, String>,
  arg: IndexMap<String, String>,
  env: IndexMap<String, String>,
  label: IndexMap<String, String>,
  /// Set only for the `Context` of a `FROM` line: its value after
  /// expansion against the globally-visible pre-`FROM` `ARG`s.
  from_value: Option<String>,
}

impl Context {
  /// The expanded `FROM` value, if this snapshot belongs to a `FROM` line.
  pub fn from_value(&self) -> Option<&str> {
    self.from_value.as_deref()
  }
}

impl Context {
  /// Pairs defined by this exact line, for `kind`.
  pub fn get_line_value(&self, kind: Kind) -> &IndexMap<String, String> {
    match kind {
      Kind::Arg => &self.line_arg,
      Kind::Env => &self.line_env,
      Kind::Label => &self.line_label,
    }
  }

  /// Cumulative bindings of `kind` visible at this line, in the current
  /// stage.
  pub fn get_values(&self, kind: Kind) -> &IndexMap<String, String> {
    match kind {
      Kind::Arg => &self.arg,
      Kind::Env => &self.env,
      Kind::Label => &self.label,
    }
  }
}

fn lookup<'a>(
  env: &'a IndexMap<String, String>,
  arg: &'a IndexMap<String, String>,
  parent_env: &'a IndexMap<String, String>,
  use_parent_env: bool,
) -> impl Fn(&str) -> Option<String> + 'a {
  move |name: &str| {
    if let Some(v) = env.get(name) {
      return Some(v.clone());
    }
    if let Some(v) = arg.get(name) {
      return Some(v.clone());
    }
    if use_parent_env {
      if let Some(v) = parent_env.get(name) {
        return Some(v.clone());
      }
    }
    None
  }
}

fn expand_pair(value: &str, literal: bool, env_replace: bool, f: &dyn Fn(&str) -> Option<String>) -> String {
  if !env_replace || literal {
    value.to_string()
  } else {
    expand::expand(value, f)
  }
}

/// Walks `structure`'s non-comment entries in order, producing one
/// [`Context`] per entry. `ARG`/`ENV`/`LABEL` accumulate into the current
/// stage's bindings; every `FROM` starts a fresh stage. `ARG`s declared
/// before the first `FROM` are folded into `build_args` overrides and
/// remain visible only to `FROM` lines (including later stages'), never to
/// ordinary instruction bodies.
pub fn build(
  structure: &[StructureItem],
  env_replace: bool,
  parent_env: &IndexMap<String, String>,
  build_args: &IndexMap<String, String>,
) -> Result<Vec<Context>> {
  let mut out = Vec::with_capacity(structure.len());

  let mut pre_from_args: IndexMap<String, String> = IndexMap::new();
  let mut cur_arg: IndexMap<String, String> = IndexMap::new();
  let mut cur_env: IndexMap<String, String> = IndexMap::new();
  let mut cur_label: IndexMap<String, String> = IndexMap::new();
  let mut seen_from = false;
  let mut first_stage_uses_parent_env = false;
  let mut stage_count = 0usize;

  for item in structure {
    if item.is_comment() {
      continue;
    }

    match item.instruction.as_str() {
      "FROM" => {
        let from_lookup = lookup(&IndexMap::new(), &pre_from_args, &IndexMap::new(), false);
        let expanded = if env_replace { expand::expand(&item.value, &from_lookup) } else { item.value.clone() };

        stage_count += 1;
        if stage_count == 1 {
          let (image, _alias) = image::image_from(&expanded);
          first_stage_uses_parent_env =
            !image.as_deref().unwrap_or("").eq_ignore_ascii_case("scratch");
        }

        seen_from = true;
        cur_arg = IndexMap::new();
        cur_env = IndexMap::new();
        cur_label = IndexMap::new();

        out.push(Context {
          arg: cur_arg.clone(),
          env: cur_env.clone(),
          label: cur_label.clone(),
          from_value: Some(expanded),
          ..Context::default()
        });
      }

      "ARG" => {
        let use_parent = seen_from && stage_count == 1 && first_stage_uses_parent_env;
        let f = lookup(&cur_env, &cur_arg, parent_env, use_parent);
        let pairs = kv::tokenize(&item.value)?;
        let mut line_arg = IndexMap::new();

        for p in pairs {
          let effective = if p.has_value {
            let default_value = expand_pair(&p.value, p.value_literal, env_replace, &f);
            build_args.get(&p.key).cloned().unwrap_or(default_value)
          } else {
            // A bare re-declaration (`ARG name`, no value of its own) picks
            // up the build arg if one was supplied, else the global default
            // established before the first `FROM`, else "".
            build_args
              .get(&p.key)
              .or_else(|| pre_from_args.get(&p.key))
              .cloned()
              .unwrap_or_default()
          };

          line_arg.insert(p.key.clone(), effective.clone());
          cur_arg.insert(p.key.clone(), effective.clone());

          if !seen_from {
            pre_from_args.insert(p.key, effective);
          }
        }

        out.push(Context {
          line_arg,
          arg: cur_arg.clone(),
          env: cur_env.clone(),
          label: cur_label.clone(),
          ..Context::default()
        });
      }

      // ENV/LABEL are tracked even before the first FROM: without any
      // stage boundary yet, the file behaves as a single implicit stage
      // and these bindings simply carry forward until a FROM resets them.
      "ENV" => {
        let use_parent = stage_count == 1 && first_stage_uses_parent_env;
        let f = lookup(&cur_env, &cur_arg, parent_env, use_parent);
        let pairs = kv::tokenize(&item.value)?;
        let mut line_env = IndexMap::new();

        for p in pairs {
          let value = expand_pair(&p.value, p.value_literal, env_replace, &f);
          line_env.insert(p.key.clone(), value.clone());
          cur_env.insert(p.key, value);
        }

        out.push(Context {
          line_env,
          arg: cur_arg.clone(),
          env: cur_env.clone(),
          label: cur_label.clone(),
          ..Context::default()
        });
      }

      "LABEL" => {
        let use_parent = stage_count == 1 && first_stage_uses_parent_env;
        let f = lookup(&cur_env, &cur_arg, parent_env, use_parent);
        let pairs = kv::tokenize(&item.value)?;
        let mut line_label = IndexMap::new();

        for p in pairs {
          let key = expand_pair(&p.key, p.key_literal, env_replace, &f);
          let value = expand_pair(&p.value, p.value_literal, env_replace, &f);
          line_label.insert(key.clone(), value.clone());
          cur_label.insert(key, value);
        }

        out.push(Context {
          line_label,
          arg: cur_arg.clone(),
          env: cur_env.clone(),
          label: cur_label.clone(),
          ..Context::default()
        });
      }

      _ => {
        out.push(Context {
          arg: cur_arg.clone(),
          env: cur_env.clone(),
          label: cur_label.clone(),
          ..Context::default()
        });
      }
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scanner;
  use pretty_assertions::assert_eq;

  fn run(content: &str, build_args: &[(&str, &str)], parent_env: &[(&str, &str)]) -> Vec<Context> {
    let escape = scanner::detect_escape(content);
    let structure = scanner::scan(content, escape);
    let build_args: IndexMap<String, String> =
      build_args.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let parent_env: IndexMap<String, String> =
      parent_env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    build(&structure, true, &parent_env, &build_args).unwrap()
  }

  #[test]
  fn arg_before_from_resolves_base_image_and_does_not_leak() {
    let content = "ARG BASE=centos:latest\nFROM $BASE\n";
    let ctx = run(content, &[("BASE", "fedora:latest")], &[]);
    // last context corresponds to FROM
    let from_ctx = ctx.last().unwrap();
    assert!(from_ctx.get_values(Kind::Arg).is_empty());
  }

  #[test]
  fn env_and_label_accumulate_and_reset_per_stage() {
    let content = "FROM a\nENV X=1\nFROM b\nLABEL y=2\n";
    let ctx = run(content, &[], &[]);
    // after "ENV X=1" (index 1), env has X
    assert_eq!(ctx[1].get_values(Kind::Env).get("X"), Some(&"1".to_string()));
    // after second FROM (index 2), env resets
    assert!(ctx[2].get_values(Kind::Env).is_empty());
    assert_eq!(ctx[3].get_values(Kind::Label).get("y"), Some(&"2".to_string()));
  }

  #[test]
  fn label_key_is_expanded() {
    let content = "FROM a\nENV FOOBAR=\"foo bar\"\nLABEL \"$FOOBAR\"=\"baz\"\n";
    let ctx = run(content, &[], &[]);
    let labels = ctx.last().unwrap().get_values(Kind::Label);
    assert_eq!(labels.get("foo bar"), Some(&"baz".to_string()));
  }

  #[test]
  fn single_quoted_value_never_expands() {
    let content = "FROM a\nENV V=v\nLABEL l='$V'\n";
    let ctx = run(content, &[], &[]);
    let labels = ctx.last().unwrap().get_values(Kind::Label);
    assert_eq!(labels.get("l"), Some(&"$V".to_string()));
  }

  #[test]
  fn mixed_pre_from_args_only_override_what_build_args_supply() {
    let content = "ARG REGISTRY=docker.io\nARG TAG=latest\nFROM $REGISTRY/alpine:$TAG\n";
    let ctx = run(content, &[("TAG", "3.11")], &[]);
    let from_ctx = ctx.last().unwrap();
    assert_eq!(from_ctx.from_value(), Some("docker.io/alpine:3.11"));
    assert!(from_ctx.get_values(Kind::Arg).is_empty());
  }

  #[test]
  fn mixed_top_arg_context_structure() {
    let content = "ARG image=centos\nARG version=latest\nFROM $image:$version\nARG image\nARG key\n";
    let build_args = [("version", "8"), ("key", "value")];
    let ctx = run(content, &build_args, &[]);

    assert_eq!(ctx.len(), 5);
    assert_eq!(ctx[0].get_values(Kind::Arg).get("image"), Some(&"centos".to_string()));
    assert_eq!(ctx[1].get_values(Kind::Arg).get("image"), Some(&"centos".to_string()));
    assert_eq!(ctx[1].get_values(Kind::Arg).get("version"), Some(&"8".to_string()));
    assert!(ctx[2].get_values(Kind::Arg).is_empty());
    assert_eq!(ctx[3].get_values(Kind::Arg).len(), 1);
    assert_eq!(ctx[3].get_values(Kind::Arg).get("image"), Some(&"centos".to_string()));
    assert_eq!(ctx[4].get_values(Kind::Arg).get("image"), Some(&"centos".to_string()));
    assert_eq!(ctx[4].get_values(Kind::Arg).get("key"), Some(&"value".to_string()));
  }

  #[test]
  fn bare_redeclared_arg_inherits_build_arg_then_global_default() {
    let content = "ARG foo=\"baz\"\nARG not=\"used\"\nFROM parent\nARG foo\nARG bar\nLABEL label=\"$foo $bar\"\n";
    let ctx = run(content, &[("bar", "baz")], &[]);
    let last = ctx.last().unwrap();
    assert_eq!(last.get_values(Kind::Arg).get("foo"), Some(&"baz".to_string()));
    assert_eq!(last.get_values(Kind::Arg).get("bar"), Some(&"baz".to_string()));
    assert_eq!(last.get_values(Kind::Label).get("label"), Some(&"baz baz".to_string()));
  }

  #[test]
  fn label_and_env_without_any_from_form_an_implicit_stage() {
    let content = "CMD xyz\nLABEL a=b c=d\nENV h=i\nARG j=k\n";
    let ctx = run(content, &[], &[]);
    let last = ctx.last().unwrap();
    assert_eq!(last.get_values(Kind::Label).get("a"), Some(&"b".to_string()));
    assert_eq!(last.get_values(Kind::Env).get("h"), Some(&"i".to_string()));
    assert_eq!(last.get_values(Kind::Arg).get("j"), Some(&"k".to_string()));
  }
}
