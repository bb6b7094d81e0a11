//! Applying bundled snippets to a document.

use std::str::FromStr;

use serde::Serialize;

use crate::config::InsertionPosition;
use crate::{Error, Result};

/// A byte range in the document; `start == end` is a bare cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn cursor(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }
}

impl FromStr for Selection {
    type Err = Error;

    /// Parse `OFFSET` or `START..END` (byte offsets).
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<usize>().map_err(|_| {
                Error::InvalidInput(format!("'{}' is not a byte offset or START..END range", s))
            })
        };
        match s.split_once("..") {
            Some((start, end)) => Ok(Self {
                start: parse(start)?,
                end: parse(end)?,
            }),
            None => Ok(Self::cursor(parse(s)?)),
        }
    }
}

/// Insert `bundled` into `document`, returning the new document text.
///
/// The inserted text is `bundled` with trailing whitespace trimmed plus a
/// single newline. `End` appends after the last character; `AtCursor`
/// replaces `selection`.
pub fn insert_bundle(
    document: &str,
    bundled: &str,
    position: InsertionPosition,
    selection: Option<Selection>,
) -> Result<String> {
    let text = format!("{}\n", bundled.trim_end());

    match position {
        InsertionPosition::End => Ok(format!("{}{}", document, text)),
        InsertionPosition::AtCursor => {
            let selection = selection.ok_or_else(|| {
                Error::InvalidInput("cursor insertion needs a selection".to_string())
            })?;
            validate(document, selection)?;

            let mut out = String::with_capacity(document.len() + text.len());
            out.push_str(&document[..selection.start]);
            out.push_str(&text);
            out.push_str(&document[selection.end..]);
            Ok(out)
        }
    }
}

fn validate(document: &str, selection: Selection) -> Result<()> {
    if selection.start > selection.end || selection.end > document.len() {
        return Err(Error::InvalidInput(format!(
            "selection {}..{} is outside the document ({} bytes)",
            selection.start,
            selection.end,
            document.len()
        )));
    }
    for offset in [selection.start, selection.end] {
        if !document.is_char_boundary(offset) {
            return Err(Error::InvalidInput(format!(
                "offset {} is inside a multi-byte character",
                offset
            )));
        }
    }
    Ok(())
}
