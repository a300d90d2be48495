//! Quote-aware splitting of delimited text lines.
//!
//! A [`Tokenizer`] is bound to one delimiter and built once per import run,
//! then passed by reference through the pipeline. A delimiter splits the
//! line only when an even number of double quotes precede it.

use crate::error::{LoaderError, Result};

const QUOTE: char = '"';

/// Line splitter for a single delimiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenizer {
    delimiter: String,
}

impl Tokenizer {
    /// Create a tokenizer for `delimiter`.
    ///
    /// The delimiter may be several characters long but must not be empty
    /// and must not contain a double quote.
    pub fn new(delimiter: impl Into<String>) -> Result<Self> {
        let delimiter = delimiter.into();

        if delimiter.is_empty() {
            return Err(LoaderError::configuration("Delimiter must not be empty"));
        }
        if delimiter.contains(QUOTE) {
            return Err(LoaderError::configuration(
                "Delimiter must not contain a double quote",
            ));
        }

        Ok(Self { delimiter })
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Split `line` into cleaned field values.
    ///
    /// Each field loses one leading and one trailing quote (if present) and
    /// its trailing whitespace. Leading whitespace survives.
    pub fn split(&self, line: &str) -> Vec<String> {
        self.split_raw(line)
            .into_iter()
            .map(|field| clean_field(field).to_string())
            .collect()
    }

    /// Split `line` on unquoted delimiters without cleaning the fields
    pub fn split_raw<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let delimiter = self.delimiter.as_str();
        let mut fields = Vec::new();
        let mut quotes = 0usize;
        let mut start = 0usize;
        let mut i = 0usize;

        while i < line.len() {
            let rest = &line[i..];

            if rest.starts_with(QUOTE) {
                quotes += 1;
                i += QUOTE.len_utf8();
                continue;
            }

            if quotes % 2 == 0 && rest.starts_with(delimiter) {
                fields.push(&line[start..i]);
                i += delimiter.len();
                start = i;
                continue;
            }

            i += rest.chars().next().map_or(1, char::len_utf8);
        }

        fields.push(&line[start..]);
        fields
    }
}

/// True when the line has an even number of double quotes.
///
/// Lines failing this check still split, but no delimiter after the
/// unmatched quote is honoured.
pub fn has_balanced_quotes(line: &str) -> bool {
    line.matches(QUOTE).count() % 2 == 0
}

fn clean_field(field: &str) -> &str {
    let field = field.strip_prefix(QUOTE).unwrap_or(field);
    let field = field.strip_suffix(QUOTE).unwrap_or(field);
    field.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comma() -> Tokenizer {
        Tokenizer::new(",").unwrap()
    }

    #[test]
    fn test_simple_split() {
        assert_eq!(comma().split("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quoted_field_containing_delimiter() {
        let fields = comma().split(r#"1,"Smith, John",42"#);
        assert_eq!(fields, vec!["1", "Smith, John", "42"]);
    }

    #[test]
    fn test_leading_whitespace_preserved_trailing_trimmed() {
        let fields = comma().split(r#""  padded  ",x   "#);
        assert_eq!(fields, vec!["  padded", "x"]);
    }

    #[test]
    fn test_empty_line_single_empty_field() {
        assert_eq!(comma().split(""), vec![""]);
    }

    #[test]
    fn test_empty_fields_kept() {
        assert_eq!(comma().split("a,,c,"), vec!["a", "", "c", ""]);
    }

    #[test]
    fn test_doubled_quotes_do_not_change_parity() {
        let fields = comma().split(r#""say ""hi"", ok",next"#);
        assert_eq!(fields, vec![r#"say ""hi"", ok"#, "next"]);
    }

    #[test]
    fn test_multi_character_delimiter() {
        let tokenizer = Tokenizer::new("||").unwrap();
        assert_eq!(
            tokenizer.split(r#"a||"b||c"||d"#),
            vec!["a", "b||c", "d"]
        );
    }

    #[test]
    fn test_tab_and_pipe_delimiters() {
        let tab = Tokenizer::new("\t").unwrap();
        assert_eq!(tab.split("a\tb, c\td"), vec!["a", "b, c", "d"]);

        let pipe = Tokenizer::new("|").unwrap();
        assert_eq!(pipe.split("x|\"y|z\""), vec!["x", "y|z"]);
    }

    #[test]
    fn test_unicode_content() {
        assert_eq!(comma().split("ünï,çødé"), vec!["ünï", "çødé"]);
    }

    #[test]
    fn test_unbalanced_quote_stops_splitting() {
        let line = r#"a,"open,b,c"#;
        assert!(!has_balanced_quotes(line));
        assert_eq!(comma().split(line), vec!["a", "open,b,c"]);
    }

    #[test]
    fn test_split_raw_keeps_quotes() {
        assert_eq!(comma().split_raw(r#""a",b "#), vec![r#""a""#, "b "]);
    }

    #[test]
    fn test_invalid_delimiters() {
        assert!(Tokenizer::new("").is_err());
        assert!(Tokenizer::new("\"").is_err());
    }
}
