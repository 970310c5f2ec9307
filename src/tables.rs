//! A general-purpose DSSAT reader driven by a book of column schemas.
//!
//! [`TableReader`] reads every file in an archive the same way: titles name
//! sections, headers select a [`Schema`] from a [`SchemaBook`], and each data
//! line becomes one record appended under `section -> header`. Files are laid
//! out under the reader's namespace:
//!
//! ```text
//! namespace
//! ├── experiment | analysis | treatment   section -> header -> [records]
//! └── weather | soil -> FILE NAME         section -> header -> [records]
//! ```
//!
//! ```
//! use dssatformat::format_specs::Schema;
//! use dssatformat::tables::{SchemaBook, TableReader};
//!
//! let book = SchemaBook::new()
//!     .with_schema("treatments", "@N R O C TNAME", Schema::from_pairs([("trno", 2), ("sq", 2), ("op", 2), ("co", 2), ("tname", 26)]).unwrap())
//!     .with_any_section("@DATE  SRAD", Schema::from_pairs([("w_date", 5), ("srad", 6)]).unwrap())
//!     .with_date_fields(["w_date"]);
//! let reader = TableReader::new("dssat", book);
//! ```
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::archive::{InputHolder, LineSource};
use crate::dssat_error::DResult;
use crate::flags::{section_from_title, LineFlags, SectionTitles};
use crate::format_specs::Schema;
use crate::holder::{DataHolder, Value};
use crate::input::DssatInput;
use crate::parsing::{translate_date, trim_blank, Sentinels};

/// Column schemas keyed by section and header.
///
/// Headers may be given as they appear in the file (`@N R O C TNAME`); they are
/// stored the way [`LineFlags`] records them: without the `@`, trimmed, lower-cased.
#[derive(Debug, Clone, Default)]
pub struct SchemaBook {
    by_section: HashMap<(String, String), Schema>,
    any_section: HashMap<String, Schema>,
    date_fields: HashSet<String>,
}

impl SchemaBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` for data lines under `header` in `section`.
    pub fn with_schema(mut self, section: &str, header: &str, schema: Schema) -> Self {
        self.by_section.insert((section_key(section), header_key(header)), schema);
        self
    }

    /// Register `schema` for data lines under `header` in any section without a
    /// schema of its own.
    pub fn with_any_section(mut self, header: &str, schema: Schema) -> Self {
        self.any_section.insert(header_key(header), schema);
        self
    }

    /// Name fields holding `yyddd` dates. Their values are stored as `yyyymmdd`.
    pub fn with_date_fields<I, S>(mut self, names: I) -> Self
    where I: IntoIterator<Item = S>,
          S: Into<String>
    {
        self.date_fields.extend(names.into_iter().map(Into::into));
        self
    }

    /// The schema for a `(section, header)` pair as recorded in [`LineFlags`].
    pub fn lookup(&self, section: &str, header: &str) -> Option<&Schema> {
        self.by_section.get(&(section.to_string(), header.to_string()))
            .or_else(|| self.any_section.get(header))
    }

    pub fn is_date_field(&self, name: &str) -> bool {
        self.date_fields.contains(name)
    }
}

fn section_key(section: &str) -> String {
    trim_blank(section).to_lowercase()
}

fn header_key(header: &str) -> String {
    let header = header.strip_prefix('@').unwrap_or(header);
    trim_blank(header).to_lowercase()
}


/// A [`DssatInput`] that reads every file with a [`SchemaBook`].
///
/// Comment lines and data lines without a registered schema are skipped.
pub struct TableReader<T = fn(&str, &mut LineFlags)> {
    namespace: String,
    book: SchemaBook,
    titles: T,
    sentinels: Sentinels,
}

impl TableReader {
    /// A reader using [`section_from_title`] for title lines.
    pub fn new<S: Into<String>>(namespace: S, book: SchemaBook) -> Self {
        Self { namespace: namespace.into(), book, titles: section_from_title, sentinels: Sentinels::default() }
    }
}

impl<T: SectionTitles> TableReader<T> {
    /// Replace the title hook.
    pub fn with_titles<U: SectionTitles>(self, titles: U) -> TableReader<U> {
        TableReader { namespace: self.namespace, book: self.book, titles, sentinels: self.sentinels }
    }

    /// Replace the missing-value sentinels.
    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn book(&self) -> &SchemaBook {
        &self.book
    }

    /// Read one file into `tree` as `section -> header -> [records]`.
    pub fn read_source(&self, source: &mut LineSource, tree: &mut DataHolder) -> DResult<()> {
        let mut skipped = 0usize;
        self.scan_lines(source, |line, flags| {
            if !flags.is_data() {
                return Ok(());
            }

            match self.book.lookup(&flags.section, &flags.header) {
                Some(schema) => {
                    let record = self.convert_dates(schema.read_line(line));
                    tree.holder_entry(flags.section.as_str()).push_record(flags.header.as_str(), record);
                },
                None => skipped += 1,
            }
            Ok(())
        })?;

        if skipped > 0 {
            debug!("Skipped {skipped} data line(s) without a schema in '{}'", source.name());
        }
        Ok(())
    }

    fn convert_dates(&self, record: DataHolder) -> DataHolder {
        record.into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Text(raw) if self.book.is_date_field(&name) && self.is_meaningful(&raw) => {
                        Value::Text(translate_date(trim_blank(&raw)))
                    },
                    other => other,
                };
                (name, value)
            })
            .collect()
    }
}

impl<T: SectionTitles> DssatInput for TableReader<T> {
    fn set_title_flags(&self, line: &str, flags: &mut LineFlags) {
        self.titles.set_title_flags(line, flags)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn sentinels(&self) -> Sentinels {
        self.sentinels.clone()
    }

    fn read_inputs(&self, inputs: InputHolder, out: &mut DataHolder) -> DResult<()> {
        let root = out.holder_entry(self.namespace.as_str());

        let singles = [
            ("experiment", inputs.experiment),
            ("analysis", inputs.analysis),
            ("treatment", inputs.treatment),
        ];
        for (key, source) in singles {
            if let Some(mut source) = source {
                self.read_source(&mut source, root.holder_entry(key))?;
            }
        }

        for (key, sources) in [("weather", inputs.weather), ("soil", inputs.soil)] {
            for (name, mut source) in sources {
                self.read_source(&mut source, root.holder_entry(key).holder_entry(name))?;
            }
        }

        Ok(())
    }
}
