//! Glob matching for file names and wildcard segments.

use glob::{MatchOptions, Pattern};
use tracing::trace;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: !cfg!(windows),
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

/// Whether `fragment` contains wildcard syntax.
pub fn is_pattern(fragment: &str) -> bool {
  fragment.contains(['*', '?', '['])
}

/// Match a single file name against a glob pattern.
///
/// An invalid pattern matches nothing.
pub fn glob_matches(pattern: &str, file_name: &str) -> bool {
  match Pattern::new(pattern) {
    Ok(compiled) => compiled.matches_with(file_name, MATCH_OPTIONS),
    Err(err) => {
      trace!(pattern, error = %err, "ignoring invalid glob pattern");
      false
    }
  }
}
