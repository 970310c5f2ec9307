//! The reader skeleton shared by every DSSAT file family.
//!
//! A concrete reader implements [`DssatInput`]: it says how `*` title lines map
//! to sections and how to turn an [`InputHolder`] into a [`DataHolder`]. The
//! trait supplies the public entry points on top of that:
//!
//! - [`DssatInput::read_file`] opens an archive or loose file and returns the
//!   finished tree, or an error report naming the path.
//! - [`DssatInput::read_file_custom`] does the same with [`ReadSettings`]. With
//!   `lenient(true)` a failure is logged and whatever was read before it is
//!   returned instead of the error.
//!
//! Readers hold no per-file state (the line flags live inside each call), so a
//! single reader can be shared freely.
use std::path::Path;

use error_stack::{Report, ResultExt};
use tracing::{error, info};

use crate::archive::{InputHolder, LineSource};
use crate::dssat_error::{DResult, DssatError};
use crate::flags::{LineFlags, SectionTitles};
use crate::holder::DataHolder;
use crate::parsing::Sentinels;

/// Settings for reading DSSAT inputs
///
/// To use, instantiate the default version with `ReadSettings::default()` and
/// modify the desired settings with the public methods:
///
/// ```
/// # use dssatformat::input::ReadSettings;
/// let settings = ReadSettings::default().lenient(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadSettings {
    lenient: bool,
}

impl ReadSettings {
    /// Set whether a failure should be logged and the partial result returned
    /// instead of an error.
    ///
    /// Default is `false`.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}


/// A reader for one family of DSSAT files.
pub trait DssatInput {
    /// Set `flags.section` (and optionally reset header and kind) for a `*` title line.
    fn set_title_flags(&self, line: &str, flags: &mut LineFlags);

    /// Read every source in `inputs` into `out`.
    ///
    /// Anything already written to `out` when an error is returned is kept by
    /// lenient reads.
    fn read_inputs(&self, inputs: InputHolder, out: &mut DataHolder) -> DResult<()>;

    /// Label for the part of the tree this reader produces.
    fn namespace(&self) -> &str {
        "unknown"
    }

    /// Missing-value sentinels used by [`DssatInput::is_meaningful`].
    fn sentinels(&self) -> Sentinels {
        Sentinels::default()
    }

    /// Experiment name in normal form. Readers that know how to build one override this.
    fn experiment_name(&self) -> String {
        String::new()
    }

    /// `false` if `value` is one of this reader's missing-value sentinels.
    fn is_meaningful(&self, value: &str) -> bool {
        self.sentinels().is_meaningful(value)
    }

    /// Update `flags` for the next line, sending `*` titles to [`DssatInput::set_title_flags`].
    fn judge_content_type(&self, line: &str, flags: &mut LineFlags) {
        flags.judge(line, &|l: &str, f: &mut LineFlags| self.set_title_flags(l, f));
    }

    /// Run every line of `source` through the classifier, calling `on_line`
    /// with the line and the flags after it was judged.
    fn scan_lines<F>(&self, source: &mut LineSource, mut on_line: F) -> DResult<()>
    where F: FnMut(&str, &LineFlags) -> DResult<()>,
          Self: Sized
    {
        let mut flags = LineFlags::default();
        while let Some(line) = source.next_line()? {
            self.judge_content_type(&line, &mut flags);
            on_line(&line, &flags)?;
        }
        Ok(())
    }

    /// Open `path` and read it into a tree, failing on the first error.
    fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<DataHolder, Report<DssatError>>
    where Self: Sized
    {
        self.read_file_custom(path, ReadSettings::default())
    }

    /// Open `path` and read it into a tree with customized settings.
    fn read_file_custom<P: AsRef<Path>>(&self, path: P, settings: ReadSettings) -> Result<DataHolder, Report<DssatError>>
    where Self: Sized
    {
        let path = path.as_ref();
        let mut out = DataHolder::new();

        let res = InputHolder::open(path)
            .and_then(|inputs| {
                info!("Reading {} source(s) from '{}' as {}", inputs.source_count(), inputs.archive_name, self.namespace());
                self.read_inputs(inputs, &mut out)
            })
            .attach_printable_lazy(|| format!("while reading DSSAT input '{}'", path.display()));

        match res {
            Ok(()) => Ok(out),
            Err(report) if settings.lenient => {
                error!("{report:?}");
                Ok(out)
            },
            Err(report) => Err(report),
        }
    }
}
