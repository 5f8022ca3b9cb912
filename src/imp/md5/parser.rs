//! Tokenizes the text layout shared by MD5 mesh and animation files.
//!
//! A file is a `MD5Version` header, a `commandline` line, then a flat list
//! of sections: either `name value` at global scope or `name { … }` blocks
//! whose lines become elements. `//` comments are stripped up front.

use crate::{Error, ErrorKind};

const EXPECTED_VERSION: u32 = 10;

/// Longest prefix of the commandline echoed into the log.
const MAX_LOG_LINE: usize = 128;

pub(crate) struct Element {
    pub line: usize,
    pub text: String,
}

pub(crate) struct Section {
    pub elements: Vec<Element>,
    /// Value following the section name at global scope (`numJoints 3`,
    /// `frame 12`).
    pub global: String,
    pub line: usize,
    pub name: String,
}

pub(crate) fn report_warning(message: &str, line: usize) {
    warn!("line {}: {}", line, message);
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

pub(crate) fn parse_sections(text: &str) -> Result<Vec<Section>, Error> {
    let mut lines = text.lines().enumerate();

    // the version tag must come first
    let header = loop {
        match lines.next() {
            Some((num, line)) => {
                let line = strip_comment(line).trim();
                if !line.is_empty() {
                    break (num, line);
                }
            }
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidMagic,
                    "MD5Version tag has not been found",
                ))
            }
        }
    };

    let mut tokens = header.1.split_whitespace();
    if tokens.next() != Some("MD5Version") {
        return Err(Error::new(
            ErrorKind::InvalidMagic,
            "MD5Version tag has not been found",
        ));
    }

    let version = tokens
        .next()
        .and_then(|tok| tok.parse::<u32>().ok())
        .unwrap_or(0);
    if version != EXPECTED_VERSION {
        report_warning("MD5 version tag is unknown (10 is expected)", header.0 + 1);
    }

    let mut sections: Vec<Section> = vec![];
    let mut open: Option<Section> = None;
    for (num, raw) in lines {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(section) = &mut open {
            if line == "}" {
                sections.push(open.take().unwrap());
            } else {
                section.elements.push(Element {
                    line: num + 1,
                    text: line.trim_end_matches('}').trim().to_owned(),
                });
                if line.ends_with('}') {
                    sections.push(open.take().unwrap());
                }
            }

            continue;
        }

        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let opens_block = tokens.last() == Some(&"{");
        if opens_block {
            tokens.pop();
        }

        let name = match tokens.first() {
            Some(name) => (*name).to_owned(),
            None => continue,
        };

        if name == "commandline" {
            let mut echo = line;
            if echo.len() > MAX_LOG_LINE {
                let mut cut = MAX_LOG_LINE;
                while !echo.is_char_boundary(cut) {
                    cut -= 1;
                }
                echo = &echo[..cut];
            }
            info!("{}", echo);
            continue;
        }

        let section = Section {
            elements: vec![],
            global: tokens[1..].join(" "),
            line: num + 1,
            name,
        };
        if opens_block {
            open = Some(section);
        } else {
            sections.push(section);
        }
    }

    if let Some(section) = open {
        report_warning("unterminated section at end of file", section.line);
        sections.push(section);
    }

    debug!("MD5 parser end, parsed {} sections", sections.len());

    Ok(sections)
}

/// Pulls one whitespace-separated token, advancing the cursor.
pub(crate) fn next_token<'a>(cursor: &mut &'a str) -> Option<&'a str> {
    let trimmed = cursor.trim_start();
    if trimmed.is_empty() {
        *cursor = trimmed;
        return None;
    }

    let end = trimmed
        .find(char::is_whitespace)
        .unwrap_or_else(|| trimmed.len());
    let (token, rest) = trimmed.split_at(end);
    *cursor = rest;

    Some(token)
}

/// Reads a float token, reporting a warning on malformed input.
pub(crate) fn next_float(cursor: &mut &str, line: usize) -> f32 {
    match next_token(cursor) {
        Some(token) => token.parse().unwrap_or_else(|_| {
            report_warning("expected a float value", line);
            0.0
        }),
        None => {
            report_warning("unexpected end of line", line);
            0.0
        }
    }
}

pub(crate) fn next_int(cursor: &mut &str, line: usize) -> i64 {
    match next_token(cursor) {
        Some(token) => token.parse().unwrap_or_else(|_| {
            report_warning("expected an integer value", line);
            0
        }),
        None => {
            report_warning("unexpected end of line", line);
            0
        }
    }
}

/// Reads a `( x y z )` float triple.
pub(crate) fn next_triple(cursor: &mut &str, line: usize) -> [f32; 3] {
    if next_token(cursor) != Some("(") {
        report_warning("unexpected token: ( was expected", line);
    }

    let res = [
        next_float(cursor, line),
        next_float(cursor, line),
        next_float(cursor, line),
    ];

    if next_token(cursor) != Some(")") {
        report_warning("unexpected token: ) was expected", line);
    }

    res
}

/// Reads a string token, stripping enclosing quotation marks when present.
pub(crate) fn next_string(cursor: &mut &str, line: usize) -> String {
    match next_token(cursor) {
        Some(token) => {
            if token.starts_with('"') {
                if !token.ends_with('"') || token.len() < 2 {
                    report_warning("expected closing quotation marks in string", line);
                    token.trim_start_matches('"').to_owned()
                } else {
                    token[1..token.len() - 1].to_owned()
                }
            } else {
                token.to_owned()
            }
        }
        None => {
            report_warning("unexpected end of line", line);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"MD5Version 10
commandline "exported"

numJoints 1
numMeshes 1

joints {
	"origin"	-1 ( 0.0 0.0 0.0 ) ( 0.0 0.0 0.0 )
}

frame 0 {
	 0.0 0.0 0.0
}
"#;

    #[test]
    pub fn splits_sections() {
        let sections = parse_sections(SAMPLE).unwrap();
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["numJoints", "numMeshes", "joints", "frame"]);
        assert_eq!(sections[0].global, "1");
        assert_eq!(sections[3].global, "0");
        assert_eq!(sections[2].elements.len(), 1);
    }

    #[test]
    pub fn missing_version_is_fatal() {
        assert!(parse_sections("joints {\n}\n").is_err());
    }

    #[test]
    pub fn token_helpers() {
        let mut cursor = "\"bone\" -1 ( 1.0 2.0 3.0 )";
        assert_eq!(next_string(&mut cursor, 1), "bone");
        assert_eq!(next_int(&mut cursor, 1), -1);
        assert_eq!(next_triple(&mut cursor, 1), [1.0, 2.0, 3.0]);
        assert_eq!(next_token(&mut cursor), None);
    }
}
