use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// Elements removed together with everything inside them. An unclosed opening tag swallows
// the rest of the input.
static DANGEROUS_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "iframe", "object", "embed", "noscript", "template", "textarea"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?(?:</{tag}\s*>|\z)"))
                .expect("static sanitizer pattern")
        })
        .collect()
});

static COMMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").expect("static sanitizer pattern"));

// Any remaining opening, closing or self-closing tag. Its text content is kept.
static TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?[a-zA-Z][^>]*>?").expect("static sanitizer pattern"));

/// sanitize_str
///
/// Makes one user-entered string safe to keep in client state: trims it, drops script-like
/// elements with their content, strips all other markup and escapes what is left of `&`, `<`
/// and `>`.
pub fn sanitize_str(input: &str) -> String {
    let mut out = input.trim().to_string();
    for block in DANGEROUS_BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    out = COMMENTS.replace_all(&out, "").into_owned();
    out = TAGS.replace_all(&out, "").into_owned();
    out.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// sanitize_input
///
/// Recursively sanitizes every string inside `input`. Objects keep their keys, arrays their
/// order; numbers, booleans and null pass through untouched.
///
/// Never call this on a password: it feeds an authentication comparison and must reach the
/// auth API byte-for-byte.
pub fn sanitize_input(input: Value) -> Value {
    match input {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize_input(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_input).collect()),
        other => other,
    }
}
