// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use snafu::Snafu;

/// A Dockerfile parsing or rewriting error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
  #[snafu(display("could not read Dockerfile: {}", source))]
  Io { source: std::io::Error },

  #[snafu(display("{}", message))]
  InvalidArgument { message: String },

  #[snafu(display(
    "Syntax error - can't find = in \"{}\". Must be of the form: name=value", token
  ))]
  Syntax { token: String },

  #[snafu(display("no instruction matching '{}' was found", key))]
  NotFound { key: String },

  #[snafu(display("{}", message))]
  Invariant { message: String },

  #[snafu(display("{}", message))]
  TypeError { message: String },
}

/// A Dockerfile parsing Result.
pub type Result<T, E = Error> = std::result::Result<T, E>;
