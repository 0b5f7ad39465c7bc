//! Positional placeholders.
//!
//! Statements may use `?` placeholders. They are numbered in the order
//! they appear in the text and converted to `$n`, so every placeholder
//! carries its statement-wide ordinal into the AST.

use super::Error;

/// Statement text with numbered placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholders {
    /// Converted statement text.
    pub query: String,
    /// Number of `?` placeholders converted.
    pub converted: usize,
}

/// Convert `?` placeholders into `$1`, `$2`, ...
///
/// String literals, quoted identifiers, dollar-quoted strings
/// and comments are left untouched.
pub fn convert(query: &str) -> Result<Placeholders, Error> {
    let chars = query.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(query.len() + 8);
    let mut converted = 0;
    let mut numbered = false;
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '\'' | '"' => {
                let end = quoted_end(&chars, pos, c);
                out.extend(&chars[pos..end]);
                pos = end;
            }

            '-' if chars.get(pos + 1) == Some(&'-') => {
                let end = chars[pos..]
                    .iter()
                    .position(|c| *c == '\n')
                    .map(|offset| pos + offset)
                    .unwrap_or(chars.len());
                out.extend(&chars[pos..end]);
                pos = end;
            }

            '/' if chars.get(pos + 1) == Some(&'*') => {
                let end = find(&chars, pos + 2, &['*', '/'])
                    .map(|end| end + 2)
                    .unwrap_or(chars.len());
                out.extend(&chars[pos..end]);
                pos = end;
            }

            '$' => {
                let next = pos + 1;
                if chars.get(next).is_some_and(|c| c.is_ascii_digit()) {
                    // Existing $n placeholder.
                    numbered = true;
                    let end = chars[next..]
                        .iter()
                        .position(|c| !c.is_ascii_digit())
                        .map(|offset| next + offset)
                        .unwrap_or(chars.len());
                    out.extend(&chars[pos..end]);
                    pos = end;
                } else if let Some(tag_end) = dollar_tag(&chars, pos) {
                    // $tag$ ... $tag$
                    let tag = &chars[pos..=tag_end];
                    let end = find(&chars, tag_end + 1, tag)
                        .map(|end| end + tag.len())
                        .unwrap_or(chars.len());
                    out.extend(&chars[pos..end]);
                    pos = end;
                } else {
                    out.push(c);
                    pos += 1;
                }
            }

            '?' => {
                converted += 1;
                out.push('$');
                out.push_str(&converted.to_string());
                pos += 1;
            }

            // Identifiers may contain `$`, e.g. col$1.
            c if c.is_alphanumeric() || c == '_' => {
                let end = escape_string_end(&chars, pos).unwrap_or_else(|| {
                    chars[pos..]
                        .iter()
                        .position(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
                        .map(|offset| pos + offset)
                        .unwrap_or(chars.len())
                });
                out.extend(&chars[pos..end]);
                pos = end;
            }

            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    if numbered && converted > 0 {
        return Err(Error::rewrite(
            "statement mixes ? and $n placeholders",
        ));
    }

    Ok(Placeholders {
        query: out,
        converted,
    })
}

/// Position right after the closing quote. Doubled quotes are escapes.
pub(super) fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut pos = start + 1;
    while pos < chars.len() {
        if chars[pos] == quote {
            if chars.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    chars.len()
}

/// Position right after an `E'...'` string starting at `start`.
/// Backslash escapes the next character in these.
pub(super) fn escape_string_end(chars: &[char], start: usize) -> Option<usize> {
    if !matches!(chars[start], 'e' | 'E') || chars.get(start + 1) != Some(&'\'') {
        return None;
    }

    let mut pos = start + 2;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => pos += 2,
            '\'' if chars.get(pos + 1) == Some(&'\'') => pos += 2,
            '\'' => return Some(pos + 1),
            _ => pos += 1,
        }
    }
    Some(chars.len())
}

/// Position of the closing `$` of a dollar-quote tag starting at `start`.
pub(super) fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '$' => return Some(pos),
            c if c.is_alphanumeric() || c == '_' => pos += 1,
            _ => return None,
        }
    }
    None
}

pub(super) fn find(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if from > chars.len() {
        return None;
    }
    chars[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_convert() {
        let converted =
            convert("UPDATE t SET c = CASE WHEN ? THEN ? ELSE ? END WHERE user_id = ?").unwrap();
        assert_eq!(
            converted.query,
            "UPDATE t SET c = CASE WHEN $1 THEN $2 ELSE $3 END WHERE user_id = $4"
        );
        assert_eq!(converted.converted, 4);
    }

    #[test]
    fn test_skip_literals_and_comments() {
        let query = "SELECT '?', \"a?\", $$ ? $$, $x$ ? $x$ /* ? */ FROM t WHERE id = ? -- ?\n";
        let converted = convert(query).unwrap();
        assert_eq!(
            converted.query,
            "SELECT '?', \"a?\", $$ ? $$, $x$ ? $x$ /* ? */ FROM t WHERE id = $1 -- ?\n"
        );
        assert_eq!(converted.converted, 1);

        let converted = convert("SELECT 'it''s ?' WHERE a = ?").unwrap();
        assert_eq!(converted.query, "SELECT 'it''s ?' WHERE a = $1");
    }

    #[test]
    fn test_escape_strings() {
        let converted = convert(r"SELECT E'it\'s ?', e'\\' WHERE a = ? AND b = 'x\'").unwrap();
        assert_eq!(
            converted.query,
            r"SELECT E'it\'s ?', e'\\' WHERE a = $1 AND b = 'x\'"
        );
        assert_eq!(converted.converted, 1);

        // Identifiers ending in e are not escape strings.
        let converted = convert("SELECT name FROM t WHERE type = ?").unwrap();
        assert_eq!(converted.query, "SELECT name FROM t WHERE type = $1");
    }

    #[test]
    fn test_numbered() {
        let converted = convert("SELECT * FROM t WHERE a = $2 AND b = $1").unwrap();
        assert_eq!(converted.query, "SELECT * FROM t WHERE a = $2 AND b = $1");
        assert_eq!(converted.converted, 0);

        assert!(matches!(
            convert("SELECT * FROM t WHERE a = $1 AND b = ?"),
            Err(Error::Rewrite(_))
        ));
    }
}
