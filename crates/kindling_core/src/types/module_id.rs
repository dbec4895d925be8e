/// Ids that do not correspond to a file on disk are prefixed with a null byte, following the
/// convention resolver plugins already use for virtual modules.
pub const VIRTUAL_MODULE_PREFIX: char = '\0';

/// The query parameter used to bust the client's module cache after an update
pub const TIMESTAMP_QUERY: &str = "t";

pub fn is_virtual_id(id: &str) -> bool {
  id.starts_with(VIRTUAL_MODULE_PREFIX)
}

/// Strip the query and hash of an id or url, leaving the path part.
pub fn clean_url(url: &str) -> &str {
  let end = url.find(['?', '#']).unwrap_or(url.len());
  &url[..end]
}

/// Remove the cache-busting `t=` parameter, keeping any other query parameters in order.
pub fn remove_timestamp_query(url: &str) -> String {
  let Some((path, query)) = url.split_once('?') else {
    return url.to_string();
  };

  let params = query
    .split('&')
    .filter(|param| {
      let key = param.split('=').next().unwrap_or_default();
      !param.is_empty() && key != TIMESTAMP_QUERY
    })
    .collect::<Vec<_>>();

  if params.is_empty() {
    path.to_string()
  } else {
    format!("{path}?{}", params.join("&"))
  }
}

/// Append the cache-busting timestamp to a url, replacing any previous one.
pub fn with_timestamp_query(url: &str, timestamp: u64) -> String {
  let url = remove_timestamp_query(url);
  let separator = if url.contains('?') { '&' } else { '?' };
  format!("{url}{separator}{TIMESTAMP_QUERY}={timestamp}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn removes_only_the_timestamp_parameter() {
    assert_eq!(remove_timestamp_query("/a.js?t=123"), "/a.js");
    assert_eq!(remove_timestamp_query("/a.css?t=1&inline"), "/a.css?inline");
    assert_eq!(remove_timestamp_query("/a.css?inline&t=1"), "/a.css?inline");
    assert_eq!(remove_timestamp_query("/a.js"), "/a.js");
  }

  #[test]
  fn replaces_existing_timestamps() {
    assert_eq!(with_timestamp_query("/a.js", 5), "/a.js?t=5");
    assert_eq!(with_timestamp_query("/a.js?t=1", 5), "/a.js?t=5");
    assert_eq!(with_timestamp_query("/a.vue?type=style", 5), "/a.vue?type=style&t=5");
  }

  #[test]
  fn cleans_queries_and_hashes() {
    assert_eq!(clean_url("/src/a.vue?type=style#x"), "/src/a.vue");
    assert!(is_virtual_id("\0virtual:env"));
    assert!(!is_virtual_id("/src/env.js"));
  }
}
