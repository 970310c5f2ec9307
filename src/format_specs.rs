//! Column layouts for fixed-width DSSAT data lines.
//!
//! Each data line under a DSSAT header is read with a [`Schema`]: an ordered
//! list of field names and their widths in characters. The schema carves the
//! line into raw substrings without trimming them:
//!
//! ```
//! # use dssatformat::format_specs::Schema;
//! let schema = Schema::from_pairs([("l", 2), ("id_soil", 11)]).unwrap();
//! let fields = schema.split(" 1 IBMZ910014");
//! assert_eq!(fields, vec![("l", " 1"), ("id_soil", " IBMZ910014")]);
//! ```
//!
//! DSSAT's own Fortran code declares the same layouts as edit-descriptor lists
//! such as `(I2,1X,A10)`. Those can be turned into a schema directly with
//! [`Schema::from_fortran`], which parses the list into [`FortField`]s first:
//!
//! ```
//! # use dssatformat::format_specs::Schema;
//! let schema = Schema::from_fortran(&["l", "id_soil"], "(I2,1X,A10)").unwrap();
//! assert_eq!(schema.iter().collect::<Vec<_>>(), vec![("l", 2), ("id_soil", 11)]);
//! ```
use std::fmt::Display;

use itertools::{EitherOrBoth, Itertools};
use pest::{Parser, iterators::Pair, RuleType};

use crate::dssat_error::{DResult, DssatError};
use crate::holder::{DataHolder, Value};

type PResult<T> = std::result::Result<T, PError>;

/// Represents an error in parsing a format string
#[derive(Debug)]
pub struct PError;

impl <R: RuleType> From<pest::error::Error<R>> for PError {
    fn from(_value: pest::error::Error<R>) -> Self {
        Self
    }
}

impl Display for PError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Format parsing error")
    }
}

impl std::error::Error for PError {}

#[derive(Parser)]
#[grammar = "fort.pest"]
pub(crate) struct FortParser;

/// Representation of which format a real number column is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealFmt {
    D,
    E,
    F,
    G
}

impl Display for RealFmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RealFmt::D => "d",
            RealFmt::E => "e",
            RealFmt::F => "f",
            RealFmt::G => "g",
        };

        write!(f, "{s}")
    }
}

/// One entry of an edit-descriptor list, i.e. one `a`, `i`, `f` or `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FortField {
    /// A character column, "a10".
    Char{width: u32},

    /// An integer column, "i5" or "i5.2". `zeros` is the minimum number of digits.
    Integer{width: u32, zeros: Option<u32>},

    /// A real column, "f6.1", "e10.3", "g8.2" or "d12.5".
    Real{width: u32, precision: Option<u32>, fmt: RealFmt},

    /// A single blank column. "3x" expands to three of these.
    Skip
}

impl FortField {
    /// Returns `true` if the field only positions the read (X), `false` otherwise.
    pub fn is_positional(&self) -> bool {
        matches!(self, FortField::Skip)
    }

    /// Number of characters this field occupies on a line.
    pub fn width(&self) -> u32 {
        match self {
            FortField::Char { width } => *width,
            FortField::Integer { width, .. } => *width,
            FortField::Real { width, .. } => *width,
            FortField::Skip => 1,
        }
    }
}

impl Display for FortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FortField::Char { width } => write!(f, "a{width}"),
            FortField::Integer { width, zeros } => {
                if let Some(m) = zeros {
                    write!(f, "i{width}.{m}")
                } else {
                    write!(f, "i{width}")
                }
            },
            FortField::Real { width, precision, fmt } => {
                if let Some(m) = precision {
                    write!(f, "{fmt}{width}.{m}")
                } else {
                    write!(f, "{fmt}{width}")
                }
            },
            FortField::Skip => write!(f, "x"),
        }
    }
}

/// A parsed edit-descriptor list with groups and repeat counts expanded.
///
/// ```
/// # use dssatformat::format_specs::{FortFormat, FortField};
/// let ff = FortFormat::parse("(2x,a4)").unwrap();
/// assert_eq!(ff.into_fields(), vec![FortField::Skip, FortField::Skip, FortField::Char { width: 4 }]);
/// ```
#[derive(Debug, Clone)]
pub struct FortFormat {
    pub(crate) fields: Vec<FortField>
}

impl FortFormat {
    /// Parse a Fortran format string and return a `FortFormat` instance.
    ///
    /// The format string must include the opening and closing parentheses.
    /// Descriptors may be separated by commas or whitespace and are case-insensitive.
    pub fn parse(fmt_str: &str) -> PResult<Self> {
        let mut fields = vec![];
        let tree = FortParser::parse(Rule::format, fmt_str)?.next().ok_or(PError)?;

        let mut stack: Vec<_> = tree.into_inner().rev().collect();
        let mut next_repeat: usize = 1;

        while let Some(pair) = stack.pop() {
            let kind = match pair.as_rule() {
                Rule::format => return Err(PError),

                // Widths and precisions only make sense inside a field
                Rule::width | Rule::prec => return Err(PError),

                Rule::EOI => break,

                Rule::repeat => {
                    next_repeat = parse_number(&pair)? as usize;
                    continue;
                },

                Rule::field => {
                    for inner in pair.into_inner().rev() {
                        stack.push(inner);
                    }
                    continue;
                },

                Rule::expr => {
                    let mut inner: Vec<_> = pair.into_inner().collect();
                    let count = if inner.first().map(|p| p.as_rule()) == Some(Rule::repeat) {
                        parse_number(&inner.remove(0))? as usize
                    } else {
                        1
                    };

                    for _ in 0..count {
                        for p in inner.iter().rev() {
                            stack.push(p.clone());
                        }
                    }
                    next_repeat = 1;
                    continue;
                },

                Rule::skip => FortField::Skip,
                Rule::char => {
                    let (width, _) = consume_width_and_prec_from_pair(pair)?;
                    FortField::Char { width }
                },
                Rule::integer => {
                    let (width, zeros) = consume_width_and_prec_from_pair(pair)?;
                    FortField::Integer { width, zeros }
                },
                Rule::real => {
                    let fmt = match pair.as_str().chars().next().map(|c| c.to_ascii_lowercase()) {
                        Some('d') => RealFmt::D,
                        Some('e') => RealFmt::E,
                        Some('g') => RealFmt::G,
                        _ => RealFmt::F,
                    };
                    let (width, precision) = consume_width_and_prec_from_pair(pair)?;
                    FortField::Real { width, precision, fmt }
                },

                // Silent rules never show up as pairs
                _ => continue,
            };

            for _ in 0..next_repeat {
                fields.push(kind);
            }
            next_repeat = 1;
        }

        Ok(Self { fields })
    }

    /// Consume the `FortFormat` instance and return the inner `Vec<FortField>`.
    pub fn into_fields(self) -> Vec<FortField> {
        self.fields
    }

    /// Iterate over all fields in this format, including skips.
    pub fn iter_fields(&self) -> std::slice::Iter<'_, FortField> {
        self.fields.iter()
    }

    /// Return the number of non-positional fields in this format
    pub fn non_pos_len(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_positional()).count()
    }
}

fn parse_number(pair: &Pair<Rule>) -> PResult<u32> {
    pair.as_str().parse().map_err(|_| PError)
}

fn consume_width_and_prec_from_pair(pair: Pair<Rule>) -> PResult<(u32, Option<u32>)> {
    let mut width = None;
    let mut prec = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::width => width = Some(parse_number(&inner)?),
            Rule::prec => prec = Some(parse_number(&inner)?),
            _ => return Err(PError),
        }
    }

    Ok((width.ok_or(PError)?, prec))
}


/// An ordered list of `(field name, width)` pairs describing one kind of data line.
///
/// Order is significant and names are unique. Widths count characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, usize)>
}

impl Schema {
    /// Build a schema from `(name, width)` pairs.
    ///
    /// Returns [`DssatError::InvalidSchema`] if any width is zero or a name repeats.
    pub fn from_pairs<I, S>(pairs: I) -> DResult<Self>
    where I: IntoIterator<Item = (S, usize)>,
          S: Into<String>
    {
        let fields: Vec<(String, usize)> = pairs.into_iter()
            .map(|(name, width)| (name.into(), width))
            .collect();

        if let Some((name, _)) = fields.iter().find(|(_, w)| *w == 0) {
            return Err(DssatError::InvalidSchema(format!("field '{name}' has zero width")));
        }

        let dups = fields.iter().map(|(n, _)| n.as_str()).duplicates().join(", ");
        if !dups.is_empty() {
            return Err(DssatError::InvalidSchema(format!("duplicated field names: {dups}")));
        }

        Ok(Self { fields })
    }

    /// Build a schema from field names and a Fortran edit-descriptor list.
    ///
    /// Blank columns (`nX`) are added to the width of the field that follows them,
    /// since DSSAT data keeps those leading blanks inside the value. Skips after the
    /// last field are dropped. There must be exactly one name per non-skip descriptor.
    pub fn from_fortran<S: AsRef<str>>(names: &[S], fmt: &str) -> DResult<Self> {
        let ff = FortFormat::parse(fmt)?;

        let mut pending = 0;
        let mut widths = vec![];
        for field in ff.iter_fields() {
            if field.is_positional() {
                pending += field.width() as usize;
            } else {
                widths.push(pending + field.width() as usize);
                pending = 0;
            }
        }

        let mut pairs = vec![];
        for pair in names.iter().zip_longest(widths) {
            match pair {
                EitherOrBoth::Both(name, width) => pairs.push((name.as_ref().to_string(), width)),
                EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => {
                    return Err(DssatError::InvalidSchema(format!(
                        "{} field names given for {} fields in '{fmt}'", names.len(), ff.non_pos_len()
                    )));
                }
            }
        }

        Self::from_pairs(pairs)
    }

    /// Number of fields in the schema.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sum of all field widths.
    pub fn total_width(&self) -> usize {
        self.fields.iter().map(|(_, w)| w).sum()
    }

    /// Iterate over `(name, width)` in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.fields.iter().map(|(n, w)| (n.as_str(), *w))
    }

    /// Iterate over the field names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Carve a line into one substring per field, in schema order.
    ///
    /// Each field takes the next `width` characters. When the line runs out, the
    /// field being read gets whatever is left (possibly nothing) and every later
    /// field gets an empty string. Nothing is trimmed.
    pub fn split<'l>(&self, line: &'l str) -> Vec<(&str, &'l str)> {
        let mut rest = line;
        let mut out = Vec::with_capacity(self.fields.len());
        for (name, width) in self.fields.iter() {
            let (value, tail) = match rest.char_indices().nth(*width) {
                Some((i, _)) => rest.split_at(i),
                None => (rest, ""),
            };
            out.push((name.as_str(), value));
            rest = tail;
        }
        out
    }

    /// Split a line as [`Schema::split`] does and collect the fields into a record.
    pub fn read_line(&self, line: &str) -> DataHolder {
        self.split(line)
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::Text(value.to_string())))
            .collect()
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.fields.iter().map(|(n, w)| format!("{n}:{w}")).join(", ");
        write!(f, "[{s}]")
    }
}
