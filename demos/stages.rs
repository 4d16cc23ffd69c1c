// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use std::fs::File;

use dockerfile_edit::{DockerfileParser, Kind, Result};

fn wrap() -> Result<()> {
  let args: Vec<String> = std::env::args().collect();
  let path = args.get(1).expect("a path to a Dockerfile is required");
  let f = File::open(path).expect("file must be readable");

  let dockerfile = DockerfileParser::from_reader(f);
  let structure = dockerfile.structure()?;
  let context = dockerfile.context_structure()?;

  let mut stage = 0;
  for item in structure.iter().filter(|it| !it.is_comment()) {
    if item.instruction == "FROM" {
      stage += 1;
      println!("stage #{}: {}", stage, item.content.trim_end());
    } else {
      println!("  {} {}", item.instruction, item.value);
    }
  }

  if let Some(last) = context.last() {
    println!("final ENV: {:?}", last.get_values(Kind::Env));
    println!("final LABEL: {:?}", last.get_values(Kind::Label));
  }

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
