//! # Command-line tokenization.
//!
//! [`split_command`] turns a raw command string into an ordered list of
//! argument tokens, honoring double-quoted regions. [`join_command`] produces
//! the recommended quoting form, so that splitting a joined token list
//! reproduces the original tokens.
//!
//! ## Rules
//! - Whitespace outside quotes separates tokens.
//! - A double-quoted region is part of the enclosing token, quotes stripped:
//!   `ab"cd e"f` is the single token `abcd ef`.
//! - Inside quotes, `\"` yields a literal quote; any other backslash is kept
//!   as-is (permissive, shell-like).
//! - An unterminated quote fails with [`ParseError::UnterminatedQuote`]
//!   naming the offending fragment.
//!
//! ## Round-trip property
//! For any input `s`, `split_command(&join_command(&split_command(s)?))`
//! reproduces `split_command(s)`.

use crate::error::ParseError;

/// Splits a command string into argument tokens.
///
/// # Example
/// ```
/// use procbus::split_command;
///
/// let argv = split_command("grep -n \"hello world\" src/main.rs").unwrap();
/// assert_eq!(argv, vec!["grep", "-n", "hello world", "src/main.rs"]);
/// ```
pub fn split_command(command: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote_start: Option<usize> = None;

    let mut chars = command.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' if quote_start.is_none() => {
                quote_start = Some(pos);
                in_token = true;
            }
            '"' => {
                quote_start = None;
            }
            '\\' if quote_start.is_some() => {
                // Only an escaped quote is special inside a quoted region.
                if let Some(&(_, '"')) = chars.peek() {
                    chars.next();
                    current.push('"');
                } else {
                    current.push('\\');
                }
            }
            c if c.is_whitespace() && quote_start.is_none() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(start) = quote_start {
        return Err(ParseError::UnterminatedQuote {
            fragment: command[start..].to_string(),
        });
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Joins argument tokens back into a command string in the recommended
/// quoting form.
///
/// Tokens containing whitespace or quotes (and empty tokens) are wrapped in
/// double quotes, with embedded quotes backslash-escaped.
pub fn join_command<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_token(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_token(token: &str) -> String {
    let needs_quotes =
        token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '"');
    if needs_quotes {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}
