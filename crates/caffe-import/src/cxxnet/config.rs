use std::{fs, path::Path, str::Lines};

use crate::error::{Error, Result};

/// A single `name = value` pair from a cxxnet config file.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Key, trimmed.
    pub name: String,
    /// Value, trimmed and unquoted.
    pub value: String,
}

/// Iterates over the entries of a cxxnet config text in file order.
///
/// Blank lines and `#` comments are skipped. Entries are yielded verbatim: repeated names are
/// not merged, the network decides what a later entry means.
pub struct ConfigIterator<'a> {
    lines: Lines<'a>,
    line: usize,
}

impl<'a> ConfigIterator<'a> {
    /// Iterate over the entries of `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line: 0,
        }
    }
}

impl Iterator for ConfigIterator<'_> {
    type Item = Result<ConfigEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        for raw in self.lines.by_ref() {
            self.line += 1;
            match parse_line(raw) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(message) => {
                    return Some(Err(Error::Config {
                        line: self.line,
                        message,
                    }))
                }
            }
        }
        None
    }
}

/// Read and parse every entry of the config file at `path`.
pub fn read_config(path: &Path) -> Result<Vec<ConfigEntry>> {
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let entries = ConfigIterator::new(&text).collect::<Result<Vec<_>>>()?;

    log::debug!("Read {} config entries from {path:?}", entries.len());
    Ok(entries)
}

fn parse_line(raw: &str) -> core::result::Result<Option<ConfigEntry>, String> {
    let line = strip_comment(raw)?;
    if line.trim().is_empty() {
        return Ok(None);
    }

    let Some(split) = find_unquoted(line, '=') else {
        return Err(format!("expected `name = value`, found `{}`", line.trim()));
    };

    let name = line[..split].trim();
    if name.is_empty() {
        return Err("missing name before `=`".to_string());
    }
    let value = unquote(line[split + 1..].trim());

    Ok(Some(ConfigEntry::new(name.to_string(), value.to_string())))
}

/// Drop everything after the first `#` that is not inside double quotes.
fn strip_comment(line: &str) -> core::result::Result<&str, String> {
    let end = find_unquoted(line, '#').unwrap_or(line.len());
    let line = &line[..end];

    if line.chars().filter(|c| *c == '"').count() % 2 != 0 {
        return Err("unterminated quoted string".to_string());
    }

    Ok(line)
}

fn find_unquoted(line: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == needle && !quoted => return Some(index),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
