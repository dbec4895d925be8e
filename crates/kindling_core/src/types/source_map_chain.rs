use serde::Deserialize;
use serde::Serialize;
use sourcemap::SourceMap;

use super::SourceLocation;

/// The source maps produced by each transformer of a module, in the order they were applied.
///
/// Maps are kept as raw JSON and only decoded when a position has to be traced back, which is
/// rare (error overlays) compared to how often modules are transformed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SourceMapChain {
  maps: Vec<String>,
}

impl SourceMapChain {
  pub fn new() -> Self {
    SourceMapChain::default()
  }

  pub fn push(&mut self, map: String) {
    self.maps.push(map);
  }

  pub fn is_empty(&self) -> bool {
    self.maps.is_empty()
  }

  pub fn len(&self) -> usize {
    self.maps.len()
  }

  pub fn maps(&self) -> &[String] {
    &self.maps
  }

  /// Trace a 1-based position in the final output back through every map to the original source.
  ///
  /// Returns `None` when any map in the chain fails to decode or has no mapping for the position.
  pub fn original_position(&self, line: usize, column: usize) -> Option<SourceLocation> {
    let mut location = SourceLocation {
      file: None,
      line,
      column,
    };

    for raw in self.maps.iter().rev() {
      let map = match SourceMap::from_slice(raw.as_bytes()) {
        Ok(map) => map,
        Err(error) => {
          tracing::debug!(%error, "Unable to decode source map");
          return None;
        }
      };

      let token = map.lookup_token(
        location.line.checked_sub(1)? as u32,
        location.column.checked_sub(1)? as u32,
      )?;

      location = SourceLocation {
        file: token.get_source().map(String::from).or(location.file),
        line: token.get_src_line() as usize + 1,
        column: token.get_src_col() as usize + 1,
      };
    }

    Some(location)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn map(source: &str, mappings: &str) -> String {
    format!(r#"{{"version":3,"sources":["{source}"],"names":[],"mappings":"{mappings}"}}"#)
  }

  #[test]
  fn traces_positions_through_every_map() {
    let mut chain = SourceMapChain::new();
    chain.push(map("src/a.ts", "AACA"));
    chain.push(map("intermediate.js", "AAAA"));

    assert_eq!(
      chain.original_position(1, 1),
      Some(SourceLocation {
        file: Some(String::from("src/a.ts")),
        line: 2,
        column: 1,
      })
    );
  }

  #[test]
  fn empty_chain_returns_the_input_position() {
    let chain = SourceMapChain::new();

    assert_eq!(
      chain.original_position(3, 4),
      Some(SourceLocation {
        file: None,
        line: 3,
        column: 4,
      })
    );
  }

  #[test]
  fn invalid_maps_do_not_trace() {
    let mut chain = SourceMapChain::new();
    chain.push(String::from("not a map"));

    assert_eq!(chain.original_position(1, 1), None);
  }
}
