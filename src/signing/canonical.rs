//! Signature base string construction for OAuth 1.0a.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Everything except the RFC 3986 unreserved characters is encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a value for the signature base string and header.
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Reverses [`percent_encode`].
pub fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Builds the base string URI: scheme and host lower-cased, default port
/// dropped, no query or fragment.
pub fn normalize_url(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    // `Url::port` is already `None` for the scheme's default port.
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", scheme, host, port, url.path()),
        None => format!("{}://{}{}", scheme, host, url.path()),
    }
}

/// Collects the decoded query pairs of a URL.
pub fn query_parameters(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Builds the normalized parameter string.
///
/// Each key and value is percent-encoded, pairs are sorted by encoded key and
/// then encoded value, and joined with `&`.
pub fn build_parameter_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();

    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the signature base string.
///
/// Format: `METHOD&encode(base_uri)&encode(parameter_string)`
pub fn build_base_string(method: &str, base_uri: &str, parameter_string: &str) -> String {
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(base_uri),
        percent_encode(parameter_string)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("An encoded string!"), "An%20encoded%20string%21");
        assert_eq!(percent_encode("Dogs, Cats & Mice"), "Dogs%2C%20Cats%20%26%20Mice");
        assert_eq!(percent_encode("-._~"), "-._~");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
    }

    #[test]
    fn test_percent_decode_recovers_original() {
        for original in ["a b+c", "100%", "☃ snow", "x=y&z", "~tilde~"] {
            assert_eq!(percent_decode(&percent_encode(original)), original);
        }
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("HTTPS://API.Twitter.com:443/2/tweets?ids=1#frag").unwrap();
        assert_eq!(normalize_url(&url), "https://api.twitter.com/2/tweets");

        let url = Url::parse("http://127.0.0.1:8080/1.1/media/upload.json").unwrap();
        assert_eq!(normalize_url(&url), "http://127.0.0.1:8080/1.1/media/upload.json");
    }

    #[test]
    fn test_query_parameters_are_decoded() {
        let url = Url::parse("https://api.twitter.com/2/search?query=a+b&x=%21").unwrap();
        assert_eq!(
            query_parameters(&url),
            pairs(&[("query", "a b"), ("x", "!")])
        );
    }

    #[test]
    fn test_parameter_string_sorted_by_key_then_value() {
        let params = pairs(&[("b", "2"), ("a", "z"), ("a", "y"), ("c", "")]);
        assert_eq!(build_parameter_string(&params), "a=y&a=z&b=2&c=");
    }

    #[test]
    fn test_build_base_string() {
        let base = build_base_string("post", "https://api.twitter.com/1.1/x.json", "a=1&b=2");
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fx.json&a%3D1%26b%3D2"
        );
    }
}
