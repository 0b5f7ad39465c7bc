//! Rewrite logical table names into physical ones.
//!
//! Substitution runs on the deparsed (canonical) statement text.
//! Identifiers equal to the logical table name are replaced, wherever
//! they appear: FROM/INTO items and column qualifiers alike.
//! String literals, dollar-quoted strings and comments are not touched.

use super::placeholders::{dollar_tag, escape_string_end, find, quoted_end};

/// Replace the logical table name with the physical one.
pub fn rename_table(query: &str, logical: &str, physical: &str) -> String {
    let chars = query.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(query.len() + physical.len());
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '\'' => {
                let end = quoted_end(&chars, pos, c);
                out.extend(&chars[pos..end]);
                pos = end;
            }

            '"' => {
                let end = quoted_end(&chars, pos, c);
                let name = chars[pos + 1..end.saturating_sub(1).max(pos + 1)]
                    .iter()
                    .collect::<String>()
                    .replace("\"\"", "\"");
                if name == logical {
                    out.push_str(&quote(physical));
                } else {
                    out.extend(&chars[pos..end]);
                }
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

            '$' => match dollar_tag(&chars, pos) {
                Some(tag_end) if !chars[pos + 1].is_ascii_digit() => {
                    let tag = &chars[pos..=tag_end];
                    let end = find(&chars, tag_end + 1, tag)
                        .map(|end| end + tag.len())
                        .unwrap_or(chars.len());
                    out.extend(&chars[pos..end]);
                    pos = end;
                }
                _ => {
                    out.push(c);
                    pos += 1;
                }
            },

            c if c.is_alphabetic() || c == '_' => {
                if let Some(end) = escape_string_end(&chars, pos) {
                    out.extend(&chars[pos..end]);
                    pos = end;
                    continue;
                }

                let end = chars[pos..]
                    .iter()
                    .position(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
                    .map(|offset| pos + offset)
                    .unwrap_or(chars.len());
                let word = chars[pos..end].iter().collect::<String>();
                if word.to_lowercase() == logical {
                    out.push_str(&quote(physical));
                } else {
                    out.push_str(&word);
                }
                pos = end;
            }

            // Numbers, including 1e5 and $1 suffixes.
            c if c.is_ascii_digit() => {
                let end = chars[pos..]
                    .iter()
                    .position(|c| !(c.is_alphanumeric() || *c == '.' || *c == '_'))
                    .map(|offset| pos + offset)
                    .unwrap_or(chars.len());
                out.extend(&chars[pos..end]);
                pos = end;
            }

            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    out
}

/// Quote the identifier if Postgres would fold or reject it unquoted.
fn quote(identifier: &str) -> String {
    let plain = identifier
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain {
        identifier.to_owned()
    } else {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rename() {
        assert_eq!(
            rename_table(
                "SELECT users.id, 'users' FROM users WHERE users.id = $1 /* users */",
                "users",
                "users_3"
            ),
            "SELECT users_3.id, 'users' FROM users_3 WHERE users_3.id = $1 /* users */"
        );
        assert_eq!(
            rename_table(
                "INSERT INTO public.users (id, users_name) VALUES (1, $$users$$)",
                "users",
                "users_03"
            ),
            "INSERT INTO public.users_03 (id, users_name) VALUES (1, $$users$$)"
        );
        assert_eq!(
            rename_table(r"SELECT E'\' users' FROM users", "users", "users_1"),
            r"SELECT E'\' users' FROM users_1"
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(
            rename_table("SELECT * FROM \"users\" u", "users", "Users-1"),
            "SELECT * FROM \"Users-1\" u"
        );
        assert_eq!(quote("users_1"), "users_1");
        assert_eq!(quote("1users"), "\"1users\"");
    }
}
