//! Line tokenizer shared by the dump decoders.
//!
//! Tokens are separated by whitespace. A double quote opens a quoted section
//! that keeps embedded whitespace, and inside it a backslash escapes the next
//! character. Quotes never appear in token text.

/// One token from a dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// True if any part of the token came from a quoted section.
    pub quoted: bool,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Split a line into tokens, honoring quoted sections.
///
/// An unterminated quote runs to the end of the line. An empty quoted
/// string (`""`) still yields a token, so key/value pairs stay aligned.
pub fn split_quoted(line: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut in_quote = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            cur.push(c);
            escaped = false;
            continue;
        }

        if in_quote {
            match c {
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => cur.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quote = true;
                in_token = true;
                quoted = true;
            }
            c if c.is_whitespace() => {
                if in_token {
                    out.push(Token {
                        text: std::mem::take(&mut cur),
                        quoted,
                    });
                    in_token = false;
                    quoted = false;
                }
            }
            c => {
                cur.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        out.push(Token { text: cur, quoted });
    }

    out
}

/// Only the quoted tokens on a line, in order.
pub fn quoted_tokens(line: &str) -> Vec<String> {
    split_quoted(line)
        .into_iter()
        .filter(|t| t.quoted)
        .map(|t| t.text)
        .collect()
}

/// Split off the first `n` whitespace-separated words and return them with
/// the untouched remainder of the line (leading whitespace removed).
///
/// Returns `None` when the line has fewer than `n` words.
pub fn split_words(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut words = Vec::with_capacity(n);
    let mut rest = line.trim_start();

    for _ in 0..n {
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        words.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    Some((words, rest))
}

/// Remove one layer of surrounding double quotes and resolve backslash
/// escapes. Unquoted input is returned as-is.
pub fn unquote(value: &str) -> String {
    let inner = match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => return value.to_string(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Quote a token only when the engine would otherwise split it: when it
/// contains whitespace or a double quote. Embedded quotes and backslashes
/// are escaped.
pub fn quote_if_needed(s: &str) -> String {
    if !s.chars().any(|c| c.is_whitespace() || c == '"') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
