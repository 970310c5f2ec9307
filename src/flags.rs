//! Line classification for DSSAT text files.
//!
//! Every line of a DSSAT file is one of: a section title (`*`), a column header
//! (`@`), a comment (`!`), a data line, or a blank. Readers walk a file line by
//! line and keep a [`LineFlags`] value that records the current section, the
//! current header, and the kind of the line just read. Section titles are file
//! specific, so [`LineFlags::judge`] hands them to a [`SectionTitles`] hook.
//!
//! Blank lines follow a two-step rule: the first blank after non-blank content
//! clears both section and header; each further blank clears the header again.
//!
//! ```
//! use dssatformat::flags::{LineFlags, LineKind, section_from_title};
//!
//! let mut flags = LineFlags::default();
//! for line in ["*FIELDS", "@L ID_FIELD WSTA", " 1 UFGA0002 UFGA"] {
//!     flags.judge(line, &section_from_title);
//! }
//! assert_eq!(flags.section, "fields");
//! assert_eq!(flags.header, "l id_field wsta");
//! assert_eq!(flags.kind, LineKind::Data);
//! ```
use std::fmt::Display;

use crate::parsing::trim_blank;

/// What the most recently judged line was.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineKind {
    /// A title or header line, or nothing read yet.
    #[default]
    Unset,
    Comment,
    Data,
    Blank,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Unset => "",
            LineKind::Comment => "comment",
            LineKind::Data => "data",
            LineKind::Blank => "blank",
        }
    }
}

impl Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The reading state of one pass over one file.
///
/// Each pass owns its own value, so one reader can be used for any number of
/// files, including from several threads at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFlags {
    /// Lower-cased name of the current section, set only by a [`SectionTitles`] hook.
    pub section: String,
    /// The last header line, without its `@`, trimmed and lower-cased.
    pub header: String,
    pub kind: LineKind,
}

impl LineFlags {
    /// Update the flags for the next line of a file.
    ///
    /// The first matching rule wins: `*` titles go to `titles`; `@` sets the
    /// header; `!` marks a comment; any other non-blank line is data; a blank
    /// after a blank clears the header; any other blank clears section and header.
    pub fn judge<T: SectionTitles + ?Sized>(&mut self, line: &str, titles: &T) {
        if line.starts_with('*') {
            titles.set_title_flags(line, self);
        } else if let Some(header) = line.strip_prefix('@') {
            self.header = trim_blank(header).to_lowercase();
            self.kind = LineKind::Unset;
        } else if line.starts_with('!') {
            self.kind = LineKind::Comment;
        } else if !trim_blank(line).is_empty() {
            self.kind = LineKind::Data;
        } else if self.kind == LineKind::Blank {
            self.header.clear();
        } else {
            self.section.clear();
            self.header.clear();
            self.kind = LineKind::Blank;
        }
    }

    /// `true` if the last judged line was a data line.
    pub fn is_data(&self) -> bool {
        self.kind == LineKind::Data
    }
}

impl Display for LineFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}|{}|{}]", self.section, self.header, self.kind)
    }
}


/// How a reader turns a `*` title line into a section.
///
/// Implemented for any `Fn(&str, &mut LineFlags)`, so a closure or a plain
/// function such as [`section_from_title`] can be passed directly.
pub trait SectionTitles {
    fn set_title_flags(&self, line: &str, flags: &mut LineFlags);
}

impl<F: Fn(&str, &mut LineFlags)> SectionTitles for F {
    fn set_title_flags(&self, line: &str, flags: &mut LineFlags) {
        self(line, flags)
    }
}

/// Title hook suited to most DSSAT files.
///
/// The section is the text after `*` up to the first `:` or run of two blanks,
/// trimmed and lower-cased, so `*WEATHER DATA : Gainesville` becomes
/// `weather data` and `*TREATMENTS    ---FACTOR LEVELS---` becomes `treatments`.
/// Header and kind are reset.
pub fn section_from_title(line: &str, flags: &mut LineFlags) {
    let title = line.strip_prefix('*').unwrap_or(line);
    let title = title.split(':').next().unwrap_or_default();
    let title = title.split("  ").next().unwrap_or_default();
    flags.section = trim_blank(title).to_lowercase();
    flags.header.clear();
    flags.kind = LineKind::Unset;
}
