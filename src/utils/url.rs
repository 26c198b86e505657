//! URL utilities for consistent URL handling
//!
//! Users paste server addresses in many shapes (`localhost:1234`,
//! `http://host:1234/v1/`, ` http://host :1234 `). Everything that talks to
//! the server goes through [`normalize_base_url`] first so endpoint paths can
//! be appended without doubling slashes or the `/v1` segment.

const DEFAULT_SCHEME: &str = "http://";
const API_VERSION_SUFFIX: &str = "/v1";

/// Normalize a configured base URL.
///
/// Trims surrounding whitespace, removes internal whitespace, defaults to the
/// `http://` scheme, strips trailing slashes and strips an accidental trailing
/// `/v1` segment (endpoints add it back themselves).
///
/// # Examples
///
/// ```
/// use parlor::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("localhost:1234"), "http://localhost:1234");
/// assert_eq!(normalize_base_url("http://localhost:1234/v1/"), "http://localhost:1234");
/// assert_eq!(normalize_base_url(" http://my host:1234// "), "http://myhost:1234");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    let compact: String = base_url.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return compact;
    }

    let with_scheme = if compact.contains("://") {
        compact
    } else {
        format!("{DEFAULT_SCHEME}{compact}")
    };

    let mut normalized = with_scheme.trim_end_matches('/').to_string();
    let suffix_start = normalized.len().saturating_sub(API_VERSION_SUFFIX.len());
    if normalized.is_char_boundary(suffix_start)
        && normalized[suffix_start..].eq_ignore_ascii_case(API_VERSION_SUFFIX)
    {
        normalized.truncate(suffix_start);
        normalized = normalized.trim_end_matches('/').to_string();
    }
    normalized
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// The base URL is normalized first and the endpoint is appended with exactly
/// one separating slash.
///
/// # Examples
///
/// ```
/// use parlor::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("localhost:1234/v1", "v1/chat/completions"),
///     "http://localhost:1234/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
