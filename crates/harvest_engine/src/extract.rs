//! Heuristics that reduce an endpoint response to a reward code.
use serde_json::Value;
use url::Url;

const COUPON_KEYS: &[&str] = &["Coupon", "coupon", "code", "CouponCode"];
const REDIRECT_KEYS: &[&str] = &["url", "Url", "URL", "redirectUrl", "redirect_url"];

/// Extracts a code from a response body, JSON or otherwise.
///
/// Order: JSON coupon field, JSON redirect URL, coupon-shaped token in the
/// body, `code:`/`code=` marker in the body.
pub fn extract_code(body: &str) -> Option<String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let coupon = COUPON_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(non_empty_str);
        if let Some(code) = coupon {
            return Some(code.to_string());
        }
        let redirect = REDIRECT_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(non_empty_str);
        if let Some(code) = redirect.and_then(|u| code_from_url(u).or_else(|| code_from_text(u))) {
            return Some(code);
        }
    }
    code_from_text(body)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Reads the `code` query parameter of an absolute or relative URL.
pub fn code_from_url(raw: &str) -> Option<String> {
    if let Ok(url) = Url::parse(raw) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| take_token(&value).to_string())
            .filter(|code| !code.is_empty());
    }
    ["?code=", "&code="].iter().find_map(|marker| {
        let start = raw.find(marker)? + marker.len();
        let token = take_token(&raw[start..]);
        (!token.is_empty()).then(|| token.to_string())
    })
}

/// Scans free text for a coupon-shaped token (`AB-12345`), falling back to
/// an explicit `code:` or `code=` marker.
pub fn code_from_text(text: &str) -> Option<String> {
    find_coupon_token(text).or_else(|| find_code_marker(text))
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_token(s: &str) -> &str {
    let end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
    &s[..end]
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Matches `\b[A-Z]{1,2}-[A-Z0-9]{5,8}\b`.
fn find_coupon_token(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    for start in 0..bytes.len() {
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }
        let letters = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_uppercase())
            .count();
        if !(1..=2).contains(&letters) || bytes.get(start + letters) != Some(&b'-') {
            continue;
        }
        let body_start = start + letters + 1;
        let body = bytes[body_start..]
            .iter()
            .take_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            .count();
        let end = body_start + body;
        if (5..=8).contains(&body) && !bytes.get(end).copied().is_some_and(is_word_byte) {
            return Some(text[start..end].to_string());
        }
    }
    None
}

fn find_code_marker(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(pos) = rest.find("code") {
        let after = rest[pos + 4..].trim_start_matches([':', '=']);
        let separated = after.len() < rest[pos + 4..].len();
        if separated {
            let value = after.trim_start().trim_start_matches(['\'', '"']);
            let token = take_token(value);
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
        rest = &rest[pos + 4..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_coupon_field_wins() {
        let body = r#"{"Coupon":"VM-ABC123","Page":"grazie","url":"https://x.test/?code=OTHER"}"#;
        assert_eq!(extract_code(body).as_deref(), Some("VM-ABC123"));
    }

    #[test]
    fn json_redirect_url_is_searched() {
        let body = r#"{"redirectUrl":"https://x.test/thanks?op=Coop&code=R-99887"}"#;
        assert_eq!(extract_code(body).as_deref(), Some("R-99887"));
    }

    #[test]
    fn relative_redirect_uses_marker_scan() {
        assert_eq!(code_from_url("/grazie?code=ZZ-12345&op=x").as_deref(), Some("ZZ-12345"));
        assert_eq!(code_from_url("/grazie?op=x"), None);
    }

    #[test]
    fn body_token_needs_word_boundaries() {
        assert_eq!(code_from_text("your code is AB-12C45!").as_deref(), Some("AB-12C45"));
        assert_eq!(find_coupon_token("XAB-12345"), None);
        assert_eq!(find_coupon_token("AB-123456789"), None);
        assert_eq!(find_coupon_token("AB-1234"), None);
        assert_eq!(find_coupon_token("AB-12345x"), None);
    }

    #[test]
    fn marker_fallback_reads_quoted_value() {
        assert_eq!(code_from_text(r#"var code = "abc_77";"#), None);
        assert_eq!(code_from_text(r#"code: 'abc_77';"#).as_deref(), Some("abc_77"));
        assert_eq!(code_from_text("promo code=xyz-1").as_deref(), Some("xyz-1"));
    }

    #[test]
    fn nothing_found_is_none() {
        assert_eq!(extract_code("<html>sorry</html>"), None);
        assert_eq!(extract_code(r#"{"status":"ok"}"#), None);
    }
}
