//! Bracket token scanning.
//!
//! A token is any `[` ... `]` span with non-empty content. The scanner never
//! looks inside a token; text between tokens is ignored. An opening bracket
//! without a closing one ends the scan.

/// Separator used in the canonical rendering of a token sequence.
pub const TOKEN_SEPARATOR: &str = " ";

/// Iterator over the bracket tokens of a string with their byte offsets.
#[derive(Debug, Clone)]
pub struct TokenSpans<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> TokenSpans<'a> {
    /// Start scanning `input` from the beginning.
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }
}

impl<'a> Iterator for TokenSpans<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = &self.input[self.position..];
            let open = rest.find('[')?;
            let after_open = open + 1;
            let close = after_open + rest[after_open..].find(']')?;
            let start = self.position + open;
            let end = self.position + close + 1;
            self.position = end;

            // `[]` carries no content and is not a token
            if close > after_open {
                return Some((start, &self.input[start..end]));
            }
        }
    }
}

/// Iterator over the bracket tokens of a string, in order.
#[derive(Debug, Clone)]
pub struct Tokens<'a>(TokenSpans<'a>);

impl<'a> Tokens<'a> {
    /// Start scanning `input` from the beginning.
    pub fn new(input: &'a str) -> Self {
        Self(TokenSpans::new(input))
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, token)| token)
    }
}

/// Collect the tokens of `input` in order.
pub fn extract_tokens(input: &str) -> Vec<&str> {
    Tokens::new(input).collect()
}

/// Count the tokens of `input` without collecting them.
pub fn token_count(input: &str) -> usize {
    Tokens::new(input).count()
}

/// Render a token sequence in canonical form: tokens joined by single spaces.
pub fn canonical<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.as_ref().len() + 1).sum());
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push_str(TOKEN_SEPARATOR);
        }
        out.push_str(token.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple() {
        let tokens = extract_tokens("[REQ:ANALYZE] [TARGET:TRANSCRIPT] [OUT:JSON]");
        assert_eq!(tokens, vec!["[REQ:ANALYZE]", "[TARGET:TRANSCRIPT]", "[OUT:JSON]"]);
    }

    #[test]
    fn test_extract_ignores_text_between_tokens() {
        let tokens = extract_tokens("please [A] then\n[B]x[C]");
        assert_eq!(tokens, vec!["[A]", "[B]", "[C]"]);
    }

    #[test]
    fn test_extract_empty_input() {
        assert!(extract_tokens("").is_empty());
        assert!(extract_tokens("no tokens here").is_empty());
    }

    #[test]
    fn test_unclosed_bracket_stops_scan() {
        assert_eq!(extract_tokens("[A] [B"), vec!["[A]"]);
        assert!(extract_tokens("[unterminated").is_empty());
    }

    #[test]
    fn test_empty_brackets_skipped() {
        assert_eq!(extract_tokens("[] [A] []"), vec!["[A]"]);
    }

    #[test]
    fn test_nested_open_bracket_is_content() {
        assert_eq!(extract_tokens("[a[b] [c]"), vec!["[a[b]", "[c]"]);
    }

    #[test]
    fn test_stray_close_bracket_ignored() {
        assert_eq!(extract_tokens("] [A]]"), vec!["[A]"]);
    }

    #[test]
    fn test_spans_report_offsets() {
        let spans: Vec<(usize, &str)> = TokenSpans::new("ab [X] [] [YZ]").collect();
        assert_eq!(spans, vec![(3, "[X]"), (10, "[YZ]")]);
    }

    #[test]
    fn test_token_count() {
        assert_eq!(token_count("[A] [B] [C]"), 3);
        assert_eq!(token_count(""), 0);
    }

    #[test]
    fn test_unicode_content() {
        assert_eq!(extract_tokens("[ÜBER] [日本]"), vec!["[ÜBER]", "[日本]"]);
    }

    #[test]
    fn test_canonical_join() {
        assert_eq!(canonical(&["[A]", "[B]"]), "[A] [B]");
        assert_eq!(canonical::<&str>(&[]), "");
    }

    #[test]
    fn test_canonical_normalizes_spacing() {
        let tokens = extract_tokens("[A]   [B]\t[C]");
        assert_eq!(canonical(&tokens), "[A] [B] [C]");
    }
}
