//! Ingress sanitization of user-supplied string properties: strip NULs,
//! HTML-escape five characters, cap length. Pure, idempotent, and applied
//! element-wise through arrays — there is no external collaborator to
//! delegate to, so the rules live here directly.

use graphcask_core::Value;

const MAX_STRING_BYTES: usize = 10_000;

/// The entities `sanitize_string` produces. An `&` that already begins one
/// of these is left alone instead of being re-escaped to `&amp;...`, which
/// is what keeps the function idempotent on its own output.
const ENTITIES: [&str; 5] = ["&lt;", "&gt;", "&amp;", "&quot;", "&#39;"];

/// Sanitizes a single string: drops NUL bytes, HTML-escapes `< > & " '`,
/// then truncates to `MAX_STRING_BYTES` bytes on a char boundary. An `&`
/// that already starts one of the five entities above passes through
/// unescaped rather than being doubled.
pub fn sanitize_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(ch) = rest.chars().next() {
        let ch_len = ch.len_utf8();
        if ch == '\0' {
            rest = &rest[ch_len..];
            continue;
        }
        if ch == '&' {
            if let Some(entity) = ENTITIES.iter().find(|e| rest.starts_with(*e)) {
                out.push_str(entity);
                rest = &rest[entity.len()..];
                if out.len() >= MAX_STRING_BYTES {
                    break;
                }
                continue;
            }
        }
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
        rest = &rest[ch_len..];
        if out.len() >= MAX_STRING_BYTES {
            break;
        }
    }
    truncate_to_byte_limit(out, MAX_STRING_BYTES)
}

fn truncate_to_byte_limit(mut s: String, limit: usize) -> String {
    if s.len() <= limit {
        return s;
    }
    while !s.is_char_boundary(limit) {
        s.pop();
    }
    s.truncate(limit);
    s
}

/// Applies `sanitize_string` to every string leaf in `value`: the scalar
/// `String` variant and element-wise through `StringArray`. Non-string
/// scalars and other array variants pass through unchanged.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::StringArray(items) => {
            Value::StringArray(items.iter().map(|s| sanitize_string(s)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nul_bytes() {
        assert_eq!(sanitize_string("a\0b\0c"), "abc");
    }

    #[test]
    fn escapes_html_special_characters() {
        assert_eq!(
            sanitize_string(r#"<script>&"'</script>"#),
            "&lt;script&gt;&amp;&quot;&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn truncates_to_byte_limit() {
        let long = "a".repeat(MAX_STRING_BYTES + 500);
        let sanitized = sanitize_string(&long);
        assert!(sanitized.len() <= MAX_STRING_BYTES);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_STRING_BYTES);
        let sanitized = sanitize_string(&long);
        assert!(sanitized.len() <= MAX_STRING_BYTES);
        assert!(std::str::from_utf8(sanitized.as_bytes()).is_ok());
    }

    #[test]
    fn is_idempotent_on_already_sanitized_input() {
        let once = sanitize_string(r#"<a href="x">y</a>"#);
        let twice = sanitize_string(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_string_scalars_pass_through() {
        let v = Value::Int(42);
        assert_eq!(sanitize_value(v.clone()), v);
    }

    #[test]
    fn string_arrays_are_sanitized_element_wise() {
        let v = Value::StringArray(vec!["<b>".into(), "ok".into()]);
        assert_eq!(
            sanitize_value(v),
            Value::StringArray(vec!["&lt;b&gt;".into(), "ok".into()])
        );
    }
}
