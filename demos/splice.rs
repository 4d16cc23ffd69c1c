// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use std::fs::File;

use dockerfile_edit::{DockerfileParser, Result};

fn wrap() -> Result<()> {
  let args: Vec<String> = std::env::args().collect();
  let path = args.get(1).expect("a path to a Dockerfile is required");
  let f = File::open(path).expect("file must be readable");

  let mut dockerfile = DockerfileParser::from_reader(f);
  dockerfile.set_baseimage("splice:test")?;

  println!("{}", dockerfile.content()?);

  Ok(())
}

fn main() {
  match wrap() {
    Ok(()) => std::process::exit(0),
    Err(e) => {
      eprintln!("An error occurred: {}", e);
      std::process::exit(1);
    }
  }
}
