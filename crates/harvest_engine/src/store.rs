use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use csv::StringRecord;
use engine_logging::{engine_info, engine_warn};
use thiserror::Error;

use crate::persist::{read_optional, write_atomic, PersistError};

pub const EMAIL_COLUMN: &str = "EMAIL";
pub const COUPON_COLUMN: &str = "COUPON";
pub const USED_COLUMN: &str = "USED";
pub const OPERATOR_COLUMN: &str = "OPERATOR";

/// One accepted, unique result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRecord {
    pub identity: String,
    pub code: String,
}

/// Column layout used when a result file is created from scratch.
///
/// An existing file's own header always takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultLayout {
    /// `EMAIL,COUPON`
    #[default]
    Simple,
    /// `EMAIL,COUPON,USED,OPERATOR`
    Extended,
}

impl ResultLayout {
    fn header(self) -> StringRecord {
        match self {
            ResultLayout::Simple => StringRecord::from(vec![EMAIL_COLUMN, COUPON_COLUMN]),
            ResultLayout::Extended => StringRecord::from(vec![
                EMAIL_COLUMN,
                COUPON_COLUMN,
                USED_COLUMN,
                OPERATOR_COLUMN,
            ]),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read result file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("result file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to encode results: {0}")]
    Encode(#[from] csv::Error),
    #[error("failed to write results: {0}")]
    Persist(#[from] PersistError),
}

/// Parsed durable result file: header plus rows kept verbatim.
#[derive(Debug, Clone)]
pub struct ResultFile {
    header: StringRecord,
    rows: Vec<StringRecord>,
    email_col: usize,
    coupon_col: usize,
    operator_col: Option<usize>,
}

impl ResultFile {
    /// Creates an empty file model with the given layout.
    pub fn empty(layout: ResultLayout) -> Self {
        let header = layout.header();
        let operator_col = find_column(&header, OPERATOR_COLUMN);
        Self {
            header,
            rows: Vec::new(),
            email_col: 0,
            coupon_col: 1,
            operator_col,
        }
    }

    /// Loads `path`; `Ok(None)` if it does not exist or holds no header.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        let content = read_optional(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match content {
            Some(text) if !text.trim().is_empty() => Self::parse(path, &text).map(Some),
            _ => Ok(None),
        }
    }

    /// Parses result-file text. `path` only labels errors.
    ///
    /// Every complete row ends with a line terminator. A trailing row that
    /// lacks one, or has the wrong number of fields, is the remnant of an
    /// interrupted write and is dropped; a bad field count on any earlier
    /// row is corruption.
    pub fn parse(path: &Path, text: &str) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let header = reader
            .headers()
            .map_err(|err| corrupt(format!("unreadable header: {err}")))?
            .clone();
        let email_col = find_column(&header, EMAIL_COLUMN)
            .ok_or_else(|| corrupt(format!("missing {EMAIL_COLUMN} column")))?;
        let coupon_col = find_column(&header, COUPON_COLUMN)
            .ok_or_else(|| corrupt(format!("missing {COUPON_COLUMN} column")))?;
        let operator_col = find_column(&header, OPERATOR_COLUMN);

        let parsed: Vec<Result<StringRecord, csv::Error>> = reader.records().collect();
        let last = parsed.len().saturating_sub(1);
        let terminated = text.ends_with('\n') || text.ends_with('\r');
        let mut rows = Vec::with_capacity(parsed.len());
        for (pos, row) in parsed.into_iter().enumerate() {
            let row = match row {
                Ok(row) if pos == last && !terminated => {
                    engine_warn!(
                        "Discarding unterminated trailing row in {:?}: {:?}",
                        path,
                        row
                    );
                    continue;
                }
                Ok(row) if row.len() == header.len() => row,
                Ok(row) if pos == last => {
                    engine_warn!(
                        "Discarding truncated trailing row in {:?} ({} of {} fields)",
                        path,
                        row.len(),
                        header.len()
                    );
                    continue;
                }
                Err(err) if pos == last => {
                    engine_warn!("Discarding unreadable trailing row in {:?}: {}", path, err);
                    continue;
                }
                Ok(row) => {
                    return Err(corrupt(format!(
                        "row {} has {} fields, expected {}",
                        pos + 2,
                        row.len(),
                        header.len()
                    )))
                }
                Err(err) => return Err(corrupt(format!("row {}: {err}", pos + 2))),
            };
            rows.push(row);
        }

        Ok(Self {
            header,
            rows,
            email_col,
            coupon_col,
            operator_col,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().filter_map(|row| row.get(self.email_col))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().filter_map(|row| row.get(self.coupon_col))
    }

    /// Returns the value of `column` on row `row`, if both exist.
    pub fn field(&self, row: usize, column: &str) -> Option<&str> {
        let col = find_column(&self.header, column)?;
        self.rows.get(row)?.get(col)
    }

    fn append(&mut self, record: &HarvestRecord, operator: Option<&str>) {
        let mut fields = vec![String::new(); self.header.len()];
        fields[self.email_col] = record.identity.clone();
        fields[self.coupon_col] = record.code.clone();
        if let (Some(col), Some(op)) = (self.operator_col, operator) {
            fields[col] = op.to_string();
        }
        self.rows.push(StringRecord::from(fields));
    }

    fn render(&self) -> Result<String, StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| StoreError::Encode(err.into_error().into()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Header lookup ignoring case, surrounding blanks and a UTF-8 byte order mark.
fn find_column(header: &StringRecord, name: &str) -> Option<usize> {
    header.iter().position(|col| {
        col.trim_start_matches('\u{feff}')
            .trim()
            .eq_ignore_ascii_case(name)
    })
}

/// Outcome of merging the in-memory records into a durable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub appended: usize,
    pub already_present: usize,
    pub total_rows: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    seen: HashSet<String>,
    records: Vec<HarvestRecord>,
}

/// Run-scoped set of unique harvest records.
///
/// Uniqueness is by code alone. Acceptance and flushing use separate locks
/// and are never nested.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: Mutex<StoreInner>,
    flush_lock: Mutex<()>,
    layout: ResultLayout,
    operator: Option<String>,
}

impl ResultStore {
    pub fn new(layout: ResultLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Label written to the OPERATOR column of new rows, when the file has one.
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `(identity, code)` if `code` has not been accepted this run.
    ///
    /// Exactly one of any number of concurrent callers offering the same code
    /// gets `true`.
    pub fn try_accept(&self, code: &str, identity: &str) -> bool {
        self.accept(code, identity).is_some()
    }

    /// Like [`Self::try_accept`], but returns the new record's 1-based
    /// position in completion order, which is also its order on flush.
    pub fn accept(&self, code: &str, identity: &str) -> Option<u64> {
        let mut inner = self.lock_inner();
        if !inner.seen.insert(code.to_string()) {
            return None;
        }
        inner.records.push(HarvestRecord {
            identity: identity.to_string(),
            code: code.to_string(),
        });
        Some(inner.records.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.lock_inner().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accepted records in completion order.
    pub fn records(&self) -> Vec<HarvestRecord> {
        self.lock_inner().records.clone()
    }

    /// Merges the accepted records into the durable file at `path`.
    ///
    /// Existing rows are kept verbatim and in order; records whose code is
    /// already present are skipped; the rest are appended in completion
    /// order. Flushing the same records again is a no-op on the content.
    pub fn flush(&self, path: &Path) -> Result<FlushReport, StoreError> {
        let snapshot = self.records();
        let _guard = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = ResultFile::load(path)?.unwrap_or_else(|| ResultFile::empty(self.layout));
        let mut present: HashSet<String> = file.codes().map(str::to_string).collect();
        let mut appended = 0;
        let mut already_present = 0;
        for record in &snapshot {
            if present.insert(record.code.clone()) {
                file.append(record, self.operator.as_deref());
                appended += 1;
            } else {
                already_present += 1;
            }
        }

        write_atomic(path, &file.render()?)?;
        engine_info!(
            "Flushed results to {:?}: {} appended, {} already present, {} rows",
            path,
            appended,
            already_present,
            file.len()
        );
        Ok(FlushReport {
            appended,
            already_present,
            total_rows: file.len(),
        })
    }
}
