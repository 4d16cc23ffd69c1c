// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

#![forbid(unsafe_code)]

mod constants;
mod context;
mod error;
mod expand;
mod image;
mod kv;
mod parser;
mod scanner;
mod splicer;
mod store;
mod util;

pub use constants::*;
pub use context::{Context, Kind};
pub use error::*;
pub use image::*;
pub use kv::{format_pair, format_pair_with_key_quote, format_pair_with_separator, key_quote_style, tokenize, Pair};
pub use parser::*;
pub use scanner::StructureItem;
pub use splicer::{Span, Splicer};
pub use store::ReadWriteSeek;
