//! Lax `go.mod` parser.
//!
//! Only `require` directives are interpreted. Everything else (`module`,
//! `go`, `replace`, `exclude`, `retract`, `toolchain`, ...) is skipped.

use std::fmt;

/// A single `require` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub path: String,
    pub version: String,
    /// Marked `// indirect`.
    pub indirect: bool,
}

/// Why a manifest could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "go.mod:{}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Returns every requirement declared in `contents`, including indirect ones.
pub fn parse_requires(contents: &str) -> Result<Vec<Requirement>, ParseError> {
    let mut requires = Vec::new();
    let mut block: Option<(&str, usize)> = None;

    for (idx, raw) in contents.lines().enumerate() {
        let lineno = idx + 1;
        let (code, comment) = split_comment(raw);
        let code = code.trim();
        let indirect = comment.map(is_indirect).unwrap_or(false);

        if let Some((verb, _)) = block {
            if code == ")" {
                block = None;
                continue;
            }
            if code.is_empty() || verb != "require" {
                continue;
            }
            requires.push(parse_entry(code, indirect, lineno)?);
            continue;
        }

        if code.is_empty() {
            continue;
        }

        let (verb, rest) = match code.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (code, ""),
        };

        if rest == "(" {
            block = Some((verb, lineno));
            continue;
        }

        if verb == "require" {
            requires.push(parse_entry(rest, indirect, lineno)?);
        }
    }

    if let Some((verb, opened)) = block {
        return Err(ParseError {
            line: opened,
            message: format!("unterminated {} block", verb),
        });
    }

    Ok(requires)
}

fn parse_entry(entry: &str, indirect: bool, line: usize) -> Result<Requirement, ParseError> {
    let fields: Vec<&str> = entry.split_whitespace().collect();
    let [path, version] = fields.as_slice() else {
        return Err(ParseError {
            line,
            message: format!("usage: require module/path v1.2.3, got {:?}", entry),
        });
    };

    let path = unquote(path).ok_or_else(|| ParseError {
        line,
        message: format!("invalid quoted path {}", path),
    })?;
    if path.is_empty() || !version.starts_with('v') {
        return Err(ParseError {
            line,
            message: format!("invalid requirement {} {}", path, version),
        });
    }

    Ok(Requirement {
        path: path.to_string(),
        version: version.to_string(),
        indirect,
    })
}

fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find("//") {
        Some(pos) => (&line[..pos], Some(&line[pos + 2..])),
        None => (line, None),
    }
}

fn is_indirect(comment: &str) -> bool {
    comment
        .split(';')
        .any(|part| part.trim() == "indirect")
}

fn unquote(field: &str) -> Option<&str> {
    for quote in ['"', '`'] {
        if let Some(inner) = field.strip_prefix(quote) {
            return inner.strip_suffix(quote);
        }
    }
    Some(field)
}
