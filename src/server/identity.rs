use axum::http::HeaderMap;

/// Identity used when no proxy header is present (local development).
pub const FALLBACK_IDENTITY: &str = "127.0.0.1";

/// Client address for rate limiting.
///
/// Order: first `x-forwarded-for` entry, `x-real-ip`, first `x-vercel-forwarded-for`
/// entry, then [`FALLBACK_IDENTITY`].
pub fn client_identity(headers: &HeaderMap) -> String {
    first_entry(headers, "x-forwarded-for")
        .or_else(|| first_entry(headers, "x-real-ip"))
        .or_else(|| first_entry(headers, "x-vercel-forwarded-for"))
        .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
}

fn first_entry(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        h.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(client_identity(&h), "203.0.113.9");
    }

    #[test]
    fn test_header_precedence() {
        let mut h = HeaderMap::new();
        h.insert("x-vercel-forwarded-for", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_identity(&h), "198.51.100.2");

        h.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));
        assert_eq!(client_identity(&h), "198.51.100.1");

        h.insert("x-forwarded-for", HeaderValue::from_static("   "));
        assert_eq!(client_identity(&h), "198.51.100.1");
    }

    #[test]
    fn test_no_headers() {
        assert_eq!(client_identity(&HeaderMap::new()), "127.0.0.1");
    }
}
