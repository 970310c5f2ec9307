//! Opening DSSAT inputs and sorting them by file kind.
//!
//! A DSSAT experiment is usually shipped as a ZIP archive holding one experiment
//! file (`*.??X`), optional seasonal-analysis (`*.??A`) and treatment (`*.??T`)
//! files, and any number of weather (`*.WTH`) and soil (`*.SOL`) files. A single
//! loose file can be read as well. [`InputHolder::open`] opens either and files
//! every recognized entry under its [`FileKind`]; everything else is skipped.
//!
//! All inputs are decoded as ISO-8859-1, one byte per character.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::dssat_error::{DResult, DssatError};
use crate::parsing::decode_latin1;

/// The kinds of file a DSSAT archive can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    Experiment,
    Analysis,
    Treatment,
    Weather,
    Soil,
}

impl FileKind {
    /// Work out the kind of a file from its name, case-insensitively.
    ///
    /// Experiment, analysis and treatment files end in two word characters
    /// followed by `X`, `A` or `T` (e.g. `UFGA8201.MZX`); weather files end in
    /// `.WTH` and soil files in `.SOL`. Returns `None` for anything else.
    pub fn classify(name: &str) -> Option<Self> {
        static PATTERNS: OnceLock<[(FileKind, Regex); 3]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            let re = |c: &str| Regex::new(&format!(r"^.+\.[0-9A-Za-z_]{{2}}[{c}]$")).expect("static file pattern");
            [
                (FileKind::Experiment, re("Xx")),
                (FileKind::Analysis, re("Aa")),
                (FileKind::Treatment, re("Tt")),
            ]
        });

        let upper = name.to_uppercase();
        if patterns[0].1.is_match(name) {
            Some(FileKind::Experiment)
        } else if upper.ends_with(".WTH") {
            Some(FileKind::Weather)
        } else if upper.ends_with(".SOL") {
            Some(FileKind::Soil)
        } else {
            patterns[1..].iter().find(|(_, re)| re.is_match(name)).map(|(kind, _)| *kind)
        }
    }

    /// The one-letter slot this kind is filed under: `X`, `A`, `T`, `W` or `S`.
    pub fn slot(&self) -> &'static str {
        match self {
            FileKind::Experiment => "X",
            FileKind::Analysis => "A",
            FileKind::Treatment => "T",
            FileKind::Weather => "W",
            FileKind::Soil => "S",
        }
    }
}


enum SourceInner {
    Memory(Cursor<Vec<u8>>),
    Stream(BufReader<Box<dyn Read>>),
}

/// A named source of text lines.
///
/// Archive entries are held in memory and can be read again after a
/// [`rewind`](LineSource::rewind); loose files and other readers are streamed.
pub struct LineSource {
    name: String,
    inner: SourceInner,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            SourceInner::Memory(_) => "memory",
            SourceInner::Stream(_) => "stream",
        };
        f.debug_struct("LineSource").field("name", &self.name).field("kind", &kind).finish()
    }
}

impl LineSource {
    /// A source over bytes already in memory, such as a decompressed archive entry.
    pub fn from_bytes<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), inner: SourceInner::Memory(Cursor::new(bytes)) }
    }

    /// A streaming source over any reader.
    pub fn from_reader<S: Into<String>, R: Read + 'static>(name: S, reader: R) -> Self {
        let reader: Box<dyn Read> = Box::new(reader);
        Self { name: name.into(), inner: SourceInner::Stream(BufReader::new(reader)) }
    }

    /// Open a file on disk as a streaming source named after its last path segment.
    pub fn open<P: AsRef<Path>>(path: P) -> DResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                DssatError::FileMissing { path: path.to_path_buf() }
            } else {
                DssatError::IoFailure(e)
            }
        })?;
        Ok(Self::from_reader(last_segment(path), file))
    }

    /// The entry or file name this source was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the next line without its terminator (`\n`, `\r\n` or a lone `\r`).
    /// Returns `Ok(None)` at the end of the input.
    pub fn next_line(&mut self) -> DResult<Option<String>> {
        let mut buf = vec![];
        let found = match &mut self.inner {
            SourceInner::Memory(c) => read_terminated(c, &mut buf)?,
            SourceInner::Stream(r) => read_terminated(r, &mut buf)?,
        };

        if !found {
            return Ok(None);
        }
        Ok(Some(decode_latin1(&buf)))
    }

    /// Iterate over the remaining lines.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { source: self }
    }

    /// Move an in-memory source back to its first line. Returns `false` (and does
    /// nothing) for streaming sources.
    pub fn rewind(&mut self) -> bool {
        match &mut self.inner {
            SourceInner::Memory(c) => c.seek(SeekFrom::Start(0)).is_ok(),
            SourceInner::Stream(_) => false,
        }
    }
}

/// Append the bytes of one line to `buf`, consuming its terminator. Returns
/// `false` if the reader was already at its end.
fn read_terminated<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    let mut read_any = false;
    loop {
        let available = match reader.fill_buf() {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;

        match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) => {
                let is_cr = available[i] == b'\r';
                buf.extend_from_slice(&available[..i]);
                reader.consume(i + 1);
                if is_cr && reader.fill_buf()?.first() == Some(&b'\n') {
                    reader.consume(1);
                }
                return Ok(true);
            },
            None => {
                let n = available.len();
                buf.extend_from_slice(available);
                reader.consume(n);
            }
        }
    }
}

/// Iterator over the lines of a [`LineSource`], see [`LineSource::lines`].
pub struct Lines<'s> {
    source: &'s mut LineSource,
}

impl<'s> Iterator for Lines<'s> {
    type Item = DResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next_line().transpose()
    }
}


/// Upper bound on the buffer reserved up front for one archive entry.
const ENTRY_SIZE_HINT: u64 = 1 << 20;

/// Every source found in one archive or loose file, sorted by kind.
///
/// At most one experiment, analysis and treatment source is kept (the last one
/// found wins). Weather and soil sources are keyed by upper-cased name and kept
/// in name order.
#[derive(Debug, Default)]
pub struct InputHolder {
    /// `X`
    pub experiment: Option<LineSource>,
    /// `A`
    pub analysis: Option<LineSource>,
    /// `T`
    pub treatment: Option<LineSource>,
    /// `W`
    pub weather: BTreeMap<String, LineSource>,
    /// `S`
    pub soil: BTreeMap<String, LineSource>,
    /// `Z`: the last path segment of the opened archive or file.
    pub archive_name: String,
}

impl InputHolder {
    /// Open a ZIP archive (any path ending in `.zip`, case-insensitively) or a
    /// single loose DSSAT file and sort its contents.
    ///
    /// # Errors
    /// - [`DssatError::FileMissing`] if `path` does not exist,
    /// - [`DssatError::ArchiveCorrupt`] if the archive is damaged or an entry cannot be read,
    /// - [`DssatError::IoFailure`] if the file itself cannot be opened or read.
    pub fn open<P: AsRef<Path>>(path: P) -> DResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DssatError::FileMissing { path: path.to_path_buf() });
        }

        let mut inputs = InputHolder { archive_name: last_segment(path), ..Default::default() };

        if inputs.archive_name.to_uppercase().ends_with(".ZIP") {
            inputs.read_zip(path)?;
        } else {
            match FileKind::classify(&inputs.archive_name) {
                Some(kind) => {
                    let source = LineSource::open(path)?;
                    inputs.insert(kind, source);
                },
                None => debug!("Ignoring '{}': not a recognized DSSAT file", path.display()),
            }
        }

        Ok(inputs)
    }

    fn read_zip(&mut self, path: &Path) -> DResult<()> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| DssatError::from_zip(e, path))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)
                .map_err(|e| DssatError::ArchiveCorrupt {
                    path: PathBuf::from(path),
                    reason: format!("could not open entry {i}: {e}"),
                })?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let kind = match FileKind::classify(&name) {
                Some(k) => k,
                None => {
                    debug!("Ignoring archive entry '{name}'");
                    continue;
                }
            };

            // The declared size comes from the archive and may be bogus.
            let mut buf = Vec::with_capacity(entry.size().min(ENTRY_SIZE_HINT) as usize);
            entry.read_to_end(&mut buf).map_err(|e| DssatError::ArchiveCorrupt {
                path: PathBuf::from(path),
                reason: format!("could not read entry '{name}': {e}"),
            })?;
            debug!("Archive entry '{name}' ({} bytes) filed under {}", buf.len(), kind.slot());
            self.insert(kind, LineSource::from_bytes(name, buf));
        }

        Ok(())
    }

    /// File a source under `kind`. Weather and soil sources are keyed by their
    /// upper-cased name; for the other kinds a new source replaces the old one.
    pub fn insert(&mut self, kind: FileKind, source: LineSource) {
        match kind {
            FileKind::Experiment => self.experiment = Some(source),
            FileKind::Analysis => self.analysis = Some(source),
            FileKind::Treatment => self.treatment = Some(source),
            FileKind::Weather => { self.weather.insert(source.name().to_uppercase(), source); },
            FileKind::Soil => { self.soil.insert(source.name().to_uppercase(), source); },
        }
    }

    /// Total number of sources held.
    pub fn source_count(&self) -> usize {
        [&self.experiment, &self.analysis, &self.treatment].iter().filter(|s| s.is_some()).count()
            + self.weather.len()
            + self.soil.len()
    }
}

fn last_segment(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default().to_string()
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use stringreader::StringReader;

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    /// An archive of uncompressed entries, so entry bytes can be found and patched.
    fn stored_zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn find(bytes: &[u8], needle: &[u8]) -> usize {
        bytes.windows(needle.len()).position(|w| w == needle).expect("needle should be in the archive")
    }

    fn patch_u32(bytes: &mut [u8], at: usize, value: u32) {
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn open_bytes(name: &str, bytes: &[u8]) -> DResult<InputHolder> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(name);
        std::fs::write(&path, bytes)?;
        InputHolder::open(&path)
    }

    fn read_all(source: &mut LineSource) -> DResult<Vec<String>> {
        source.lines().collect()
    }

    #[test]
    fn test_classify() {
        let cases = [
            ("UFGA8201.MZX", Some(FileKind::Experiment)),
            ("ufga8201.mzx", Some(FileKind::Experiment)),
            ("dir/EXAMPLE.WHX", Some(FileKind::Experiment)),
            ("UFGA8201.MZA", Some(FileKind::Analysis)),
            ("UFGA8201.MZt", Some(FileKind::Treatment)),
            ("UFGA8201.WTH", Some(FileKind::Weather)),
            ("ufga8201.wth", Some(FileKind::Weather)),
            ("SOIL.SOL", Some(FileKind::Soil)),
            ("NOTES.TXT", None),
            (".MZX", None),
            ("UFGA.MZXX", None),
            ("UFGA.X", None),
        ];
        for (name, expected) in cases {
            assert_eq!(FileKind::classify(name), expected, "Wrong kind for '{name}'");
        }
    }

    #[test]
    fn test_slots() {
        let slots: Vec<_> = [FileKind::Experiment, FileKind::Analysis, FileKind::Treatment, FileKind::Weather, FileKind::Soil]
            .iter().map(|k| k.slot()).collect();
        assert_eq!(slots, vec!["X", "A", "T", "W", "S"]);
    }

    #[test]
    fn test_stream_lines() -> DResult<()> {
        let mut source = LineSource::from_reader("T.WTH", StringReader::new("*WEATHER\r\n@DATE\n\n82001 1.0"));
        assert_eq!(read_all(&mut source)?, vec!["*WEATHER", "@DATE", "", "82001 1.0"]);
        assert!(!source.rewind(), "Streams cannot be rewound");
        assert_eq!(source.next_line()?, None);
        Ok(())
    }

    #[test]
    fn test_carriage_return_lines() -> DResult<()> {
        let mut source = LineSource::from_reader("MAC.WTH", StringReader::new("*WEATHER\r@DATE\r\r82001\r\n82002\r"));
        assert_eq!(read_all(&mut source)?, vec!["*WEATHER", "@DATE", "", "82001", "82002"]);

        let mut source = LineSource::from_bytes("MAC.SOL", b"*SOILS\r\r\n@SITE".to_vec());
        assert_eq!(read_all(&mut source)?, vec!["*SOILS", "", "@SITE"]);
        Ok(())
    }

    #[test]
    fn test_memory_lines_rewind() -> DResult<()> {
        let mut source = LineSource::from_bytes("S.SOL", b"*SOILS\n S\xe3o Paulo\n".to_vec());
        assert_eq!(read_all(&mut source)?, vec!["*SOILS", " S\u{e3}o Paulo"]);
        assert!(source.rewind());
        assert_eq!(source.next_line()?, Some("*SOILS".to_string()));
        assert_eq!(source.name(), "S.SOL");
        Ok(())
    }

    #[test]
    fn test_zip_demultiplex() -> DResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Example.ZIP");
        write_zip(&path, &[
            ("X.MZX", "*EXP.DETAILS\n"),
            ("X.MZA", "*EXP. DATA (A)\n"),
            ("X.MZT", "*EXP. DATA (T)\n"),
            ("S.SOL", "*SOILS\n"),
            ("W1.WTH", "*WEATHER 1\n"),
            ("w2.wth", "*WEATHER 2\n"),
            ("NOTES.TXT", "ignore me"),
        ]);

        let mut inputs = InputHolder::open(&path)?;
        assert_eq!(inputs.archive_name, "Example.ZIP");
        assert_eq!(inputs.source_count(), 6);

        let a = inputs.analysis.as_mut().expect("X.MZA should be the analysis");
        assert_eq!(a.next_line()?, Some("*EXP. DATA (A)".to_string()));
        let t = inputs.treatment.as_mut().expect("X.MZT should be the treatment");
        assert_eq!(t.next_line()?, Some("*EXP. DATA (T)".to_string()));
        assert_eq!(inputs.soil.keys().collect::<Vec<_>>(), vec!["S.SOL"]);
        assert_eq!(inputs.weather.keys().collect::<Vec<_>>(), vec!["W1.WTH", "W2.WTH"]);

        let x = inputs.experiment.as_mut().expect("X.MZX should be the experiment");
        assert_eq!(x.next_line()?, Some("*EXP.DETAILS".to_string()));
        let w2 = inputs.weather.get_mut("W2.WTH").unwrap();
        assert_eq!(w2.name(), "w2.wth");
        assert_eq!(w2.next_line()?, Some("*WEATHER 2".to_string()));
        Ok(())
    }

    #[test]
    fn test_zip_later_entry_wins_and_dirs_skipped() -> DResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("two.zip");
        write_zip(&path, &[
            ("sub/", ""),
            ("A.MZX", "first"),
            ("sub/B.MZX", "second"),
            ("sub/UFGA.SOL", "soil"),
        ]);

        let mut inputs = InputHolder::open(&path)?;
        let x = inputs.experiment.as_mut().unwrap();
        assert_eq!(x.name(), "sub/B.MZX");
        assert_eq!(x.next_line()?, Some("second".to_string()));
        assert!(inputs.soil.contains_key("SUB/UFGA.SOL"));
        assert_eq!(inputs.source_count(), 2);
        Ok(())
    }

    #[test]
    fn test_loose_files() -> DResult<()> {
        let dir = tempfile::tempdir()?;

        let xpath = dir.path().join("UFGA8201.MZX");
        std::fs::write(&xpath, "*EXP.DETAILS: UFGA8201MZ\n")?;
        let mut inputs = InputHolder::open(&xpath)?;
        assert_eq!(inputs.archive_name, "UFGA8201.MZX");
        assert!(inputs.weather.is_empty() && inputs.soil.is_empty());
        let x = inputs.experiment.as_mut().unwrap();
        assert_eq!(x.next_line()?, Some("*EXP.DETAILS: UFGA8201MZ".to_string()));

        let wpath = dir.path().join("ufga8201.wth");
        std::fs::write(&wpath, "*WEATHER\n")?;
        let inputs = InputHolder::open(&wpath)?;
        assert_eq!(inputs.weather.keys().collect::<Vec<_>>(), vec!["UFGA8201.WTH"]);

        let other = dir.path().join("README.md");
        std::fs::write(&other, "hi")?;
        let inputs = InputHolder::open(&other)?;
        assert_eq!(inputs.source_count(), 0);
        assert_eq!(inputs.archive_name, "README.md");
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = InputHolder::open("/definitely/not/here/UFGA8201.ZIP").unwrap_err();
        assert!(matches!(err, DssatError::FileMissing { .. }), "Expected FileMissing, got {err}");
    }

    #[test]
    fn test_corrupt_archive() -> DResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.zip");
        let mut f = File::create(&path)?;
        f.write_all(b"this is not a zip archive")?;
        drop(f);

        let err = InputHolder::open(&path).unwrap_err();
        assert!(matches!(err, DssatError::ArchiveCorrupt { .. }), "Expected ArchiveCorrupt, got {err}");
        Ok(())
    }

    #[test]
    fn test_oversized_declared_entry_size() -> DResult<()> {
        let mut bytes = stored_zip_bytes(&[("X.MZX", "*EXP.DETAILS\n")]);
        let central = find(&bytes, b"PK\x01\x02");
        // uncompressed size field of the central directory header
        patch_u32(&mut bytes, central + 24, u32::MAX);

        let mut inputs = open_bytes("huge.zip", &bytes)?;
        let x = inputs.experiment.as_mut().unwrap();
        assert_eq!(x.next_line()?, Some("*EXP.DETAILS".to_string()));
        assert_eq!(x.next_line()?, None);
        Ok(())
    }

    #[test]
    fn test_damaged_entry_data() {
        let mut bytes = stored_zip_bytes(&[("X.MZX", "*EXP.DETAILS\n"), ("W.WTH", "82001   8.1  20.0\n")]);
        let at = find(&bytes, b"82001");
        bytes[at] = b'9';

        let err = open_bytes("crc.zip", &bytes).unwrap_err();
        match err {
            DssatError::ArchiveCorrupt { reason, .. } => assert!(reason.contains("W.WTH"), "Reason should name the entry: {reason}"),
            other => panic!("Expected ArchiveCorrupt, got {other}"),
        }
    }

    #[test]
    fn test_entry_past_end_of_archive() {
        let mut bytes = stored_zip_bytes(&[("X.MZX", "*EXP.DETAILS\n")]);
        let central = find(&bytes, b"PK\x01\x02");
        // local header offset, pointed at the last two bytes so the header is cut short
        let end = bytes.len() as u32 - 2;
        patch_u32(&mut bytes, central + 42, end);

        let err = open_bytes("cut.zip", &bytes).unwrap_err();
        assert!(matches!(err, DssatError::ArchiveCorrupt { .. }), "Expected ArchiveCorrupt, got {err}");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment(Path::new("/data/UFGA8201.ZIP")), "UFGA8201.ZIP");
        assert_eq!(last_segment(Path::new("C:\\data\\UFGA8201.ZIP")), "UFGA8201.ZIP");
        assert_eq!(last_segment(Path::new("UFGA8201.ZIP")), "UFGA8201.ZIP");
    }
}
