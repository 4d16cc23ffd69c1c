// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

/// Sentinel `instruction` value used for comment-only structure items.
pub const COMMENT_INSTRUCTION: &str = "COMMENT";

/// Default escape character used when no `# escape=` directive is present.
pub const DEFAULT_ESCAPE_CHAR: char = '\\';
