//! Small string helpers shared across the SDK
//!
//! URL encoding for OAuth query parameters, HTML escaping for the callback
//! pages, and UTF-8 safe truncation for error messages that echo provider
//! response bodies.

use std::fmt::Write;

/// URL encode a string for OAuth query parameters.
///
/// Preserves unreserved characters per RFC 3986 and percent-encodes
/// everything else, so a space becomes `%20` (never `+`).
///
/// # Example
/// ```
/// use highlevel_sdk::utils::url_encode;
///
/// assert_eq!(url_encode("contacts.readonly users.readonly"), "contacts.readonly%20users.readonly");
/// assert_eq!(url_encode("calendars/events.readonly"), "calendars%2Fevents.readonly");
/// ```
#[must_use]
pub fn url_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

/// Escape text for inclusion in an HTML document.
#[must_use]
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes, ensuring the result
/// is valid UTF-8 by finding the last valid character boundary.
///
/// # Example
/// ```
/// use highlevel_sdk::utils::safe_truncate;
///
/// // 'é' is 2 bytes - truncating at byte 4 would cut it in half
/// assert_eq!(safe_truncate("Café", 4), "Caf");
/// ```
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display with ellipsis.
///
/// Returns a new String that is at most `max_bytes` long (plus ellipsis),
/// with "..." appended if truncation occurred.
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("hello"), "hello");
        assert_eq!(url_encode("hello world"), "hello%20world");
        assert_eq!(url_encode("a+b"), "a%2Bb");
        assert_eq!(
            url_encode("http://localhost:3000/oauth/callback"),
            "http%3A%2F%2Flocalhost%3A3000%2Foauth%2Fcallback"
        );
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("plain"), "plain");
        assert_eq!(
            html_escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        let text = "Café";
        assert_eq!(safe_truncate(text, 4), "Caf");
        assert_eq!(safe_truncate(text, 5), "Café");
        assert_eq!(safe_truncate(text, 0), "");
    }

    #[test]
    fn test_truncate_for_display() {
        let text = "This is a long message";
        assert_eq!(truncate_for_display(text, 100), text);
        assert_eq!(truncate_for_display(text, 10), "This is a ...");
    }

    #[test]
    fn test_truncate_for_display_emoji() {
        let text = "Hello 🌍 World";
        assert_eq!(truncate_for_display(text, 7), "Hello ...");
    }
}
