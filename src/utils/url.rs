//! URL utility functions

use url::Url;

/// Parse a URL, accepting a bare `host/path` as `http://host/path`
pub fn parse_url(url_str: &str) -> Result<Url, url::ParseError> {
    let trimmed = url_str.trim();
    if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{}", trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_with_scheme() {
        let url = parse_url(" https://example.com/a ").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/a");
    }

    #[test]
    fn test_parse_url_without_scheme() {
        let url = parse_url("example.com:8080/path?q=1").unwrap();
        assert_eq!(url.as_str(), "http://example.com:8080/path?q=1");
        assert_eq!(url.scheme(), "http");
    }
}
