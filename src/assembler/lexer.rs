//! Line lexer for assembly source.
//!
//! Each line holds at most a label, a mnemonic or literal code, an
//! argument, and a trailing comment. The comment begins at the first
//! character that is neither alphanumeric nor whitespace and runs to the
//! end of the line; everything before it splits on whitespace into plain
//! alphanumeric tokens.

/// A tokenized source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based line number, for diagnostics.
    pub number: usize,
    /// Tokens before the comment, in source order.
    pub tokens: Vec<&'a str>,
    /// The comment, starting at its opening character.
    pub comment: Option<&'a str>,
}

/// Tokenizes a whole source text, one [`Line`] per input line.
pub fn tokenize(source: &str) -> Vec<Line<'_>> {
    source
        .lines()
        .enumerate()
        .map(|(idx, raw)| tokenize_line(idx + 1, raw))
        .collect()
}

fn tokenize_line(number: usize, raw: &str) -> Line<'_> {
    let (code, comment) = split_comment(raw);
    Line {
        number,
        tokens: code.split_whitespace().collect(),
        comment,
    }
}

/// Splits a raw line at the start of its comment, if any.
pub fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && !c.is_whitespace())
    {
        Some((at, _)) => (&line[..at], Some(line[at..].trim_end())),
        None => (line, None),
    }
}
