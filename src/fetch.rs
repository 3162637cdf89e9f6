/// Output column binding and fetching
///
/// Columns bind by 0-based ordinal or by case-insensitive name before the
/// first fetch. Each fetch materializes a row array: the driver fills one
/// packed buffer per bound column, and the engine slices the buffers into
/// typed [`Value`]s per row, with NULL carried by the indicator array.
///
/// Blob columns are never bound at the driver. After each fetch the engine
/// positions on every materialized row and drains the column through the
/// incremental retrieval call into a caller-provided sink, chunk by chunk.
///
/// Scrolling is 0-based on this surface; the driver's absolute positioning
/// is 1-based and the translation happens here, with overflow rejected.
use crate::blob::{BlobKind, BlobSink, FetchBlob};
use crate::driver::{CTag, ColumnMeta, Scroll, StmtAttr, NO_TOTAL, NULL_DATA};
use crate::error::{check, Error, Flow, Result};
use crate::statement::Statement;
use crate::value::{decode_fixed, Value};

/// Driver buffer width for one bookmark element.
const BOOKMARK_SIZE: usize = 32;

/// Scratch size for draining one blob chunk.
const BLOB_CHUNK: usize = 4096;

/// A column designator: 0-based ordinal, or name.
#[derive(Debug, Clone)]
pub enum ColumnRef {
    Ordinal(usize),
    Name(String),
}

impl From<usize> for ColumnRef {
    fn from(n: usize) -> Self {
        ColumnRef::Ordinal(n)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

/// The application type a bound column materializes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchType {
    Bool,
    TinyInt,
    UTinyInt,
    SmallInt,
    USmallInt,
    Int,
    UInt,
    BigInt,
    UBigInt,
    Float,
    Double,
    /// Character data truncated at `max_length` bytes per row.
    Text { max_length: usize },
    Date,
    Time,
    /// Decimal retrieved as character data of up to `precision` digits and
    /// re-canonicalized.
    Decimal { precision: usize },
}

impl FetchType {
    fn c_tag(self) -> CTag {
        match self {
            FetchType::Bool => CTag::Bit,
            FetchType::TinyInt => CTag::STinyInt,
            FetchType::UTinyInt => CTag::UTinyInt,
            FetchType::SmallInt => CTag::SShort,
            FetchType::USmallInt => CTag::UShort,
            FetchType::Int => CTag::SLong,
            FetchType::UInt => CTag::ULong,
            FetchType::BigInt => CTag::SBigInt,
            FetchType::UBigInt => CTag::UBigInt,
            FetchType::Float => CTag::Float,
            FetchType::Double => CTag::Double,
            FetchType::Text { .. } | FetchType::Decimal { .. } => CTag::Char,
            FetchType::Date => CTag::Date,
            FetchType::Time => CTag::Time,
        }
    }

    /// Per-element driver buffer width. Character buffers reserve one byte
    /// for the driver's terminator.
    fn elem_size(self) -> usize {
        match self {
            FetchType::Text { max_length } => max_length + 1,
            // Sign, decimal point, terminator.
            FetchType::Decimal { precision } => precision + 3,
            other => other.c_tag().fixed_size(),
        }
    }
}

/// Opaque handle to one bound column, valid until the binds are cleared.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding(usize);

/// Opaque row identity usable for bookmark scrolling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark(pub(crate) Vec<u8>);

/// Public fetch orientation. `Absolute` is 0-based.
#[derive(Debug)]
pub enum Fetch {
    Next,
    Prior,
    First,
    Last,
    Absolute(u64),
    Relative(i64),
    AtBookmark(Bookmark, i64),
}

pub(crate) enum BindKind {
    Buffer {
        fetch_type: FetchType,
        values: Vec<Value>,
    },
    Blob(FetchBlob),
}

pub(crate) struct ColumnBind {
    /// 0-based result column.
    pub(crate) column: usize,
    pub(crate) kind: BindKind,
}

/// Cached result column metadata with a lowercased name index.
pub(crate) struct Columns {
    pub(crate) meta: Vec<ColumnMeta>,
    by_name: std::collections::HashMap<String, Vec<usize>>,
}

impl Columns {
    fn new(meta: Vec<ColumnMeta>) -> Self {
        let mut by_name: std::collections::HashMap<String, Vec<usize>> =
            std::collections::HashMap::new();
        for (i, m) in meta.iter().enumerate() {
            by_name.entry(m.name.to_lowercase()).or_default().push(i);
        }
        Columns { meta, by_name }
    }
}

impl Statement {
    /// Reset all output binds and set the row array size for subsequent
    /// fetches.
    pub fn clear_binds(&mut self, row_array_size: usize) -> Result<()> {
        if row_array_size == 0 {
            return Err(Error::protocol("row array size not positive"));
        }
        let ret = self.stmt.unbind_cols();
        check(ret, &*self.stmt, "unbind_cols")?.data("unbind_cols")?;
        let ret = self.stmt.set_attr(StmtAttr::RowArraySize(row_array_size));
        check(ret, &*self.stmt, "row array size")?.data("row array size")?;
        self.row_array_size = row_array_size;
        self.binds.clear();
        self.bookmark_bound = false;
        self.last_fetch_rows = 0;
        self.bookmarks.clear();
        Ok(())
    }

    fn load_columns(&mut self) -> Result<&Columns> {
        if self.columns.is_none() {
            let ret = self.stmt.num_result_cols();
            let count = check(ret, &*self.stmt, "num_result_cols")?.data("num_result_cols")?;
            let mut meta = Vec::with_capacity(count);
            for i in 0..count {
                let ret = self.stmt.describe_col(i + 1);
                meta.push(check(ret, &*self.stmt, "describe_col")?.data("describe_col")?);
            }
            self.columns = Some(Columns::new(meta));
        }
        self.columns
            .as_ref()
            .ok_or_else(|| Error::protocol("column metadata unavailable"))
    }

    /// Number of columns in the current resultset.
    pub fn column_count(&mut self) -> Result<usize> {
        Ok(self.load_columns()?.meta.len())
    }

    /// Metadata for one column.
    pub fn column_meta(&mut self, column: impl Into<ColumnRef>) -> Result<ColumnMeta> {
        let column = column.into();
        let ordinal = self.resolve(&column)?;
        Ok(self.load_columns()?.meta[ordinal].clone())
    }

    /// Resolve a designator to a 0-based ordinal. A name matching no
    /// column or more than one column is an error.
    fn resolve(&mut self, column: &ColumnRef) -> Result<usize> {
        let columns = self.load_columns()?;
        match column {
            ColumnRef::Ordinal(n) => {
                if *n >= columns.meta.len() {
                    return Err(Error::ColumnOutOfRange {
                        column: *n,
                        count: columns.meta.len(),
                    });
                }
                Ok(*n)
            }
            ColumnRef::Name(name) => {
                match columns.by_name.get(&name.to_lowercase()).map(Vec::as_slice) {
                    None | Some([]) => Err(Error::ColumnNotFound { name: name.clone() }),
                    Some([ordinal]) => Ok(*ordinal),
                    Some(_) => Err(Error::AmbiguousColumn { name: name.clone() }),
                }
            }
        }
    }

    /// Bind a column into driver-filled buffers of the given type.
    pub fn bind(
        &mut self,
        column: impl Into<ColumnRef>,
        fetch_type: FetchType,
    ) -> Result<ColumnBinding> {
        let column = self.resolve(&column.into())?;
        let ret = self
            .stmt
            .bind_col(column + 1, fetch_type.c_tag(), fetch_type.elem_size());
        check(ret, &*self.stmt, "bind_col")?.data("bind_col")?;
        self.binds.push(ColumnBind {
            column,
            kind: BindKind::Buffer {
                fetch_type,
                values: Vec::new(),
            },
        });
        Ok(ColumnBinding(self.binds.len() - 1))
    }

    /// Bind a blob column. The column stays unbound at the driver; each
    /// fetch drains it row by row into sinks from the blob's factory.
    pub fn bind_blob(
        &mut self,
        column: impl Into<ColumnRef>,
        blob: FetchBlob,
    ) -> Result<ColumnBinding> {
        let column = self.resolve(&column.into())?;
        self.binds.push(ColumnBind {
            column,
            kind: BindKind::Blob(blob),
        });
        Ok(ColumnBinding(self.binds.len() - 1))
    }

    /// Bind the bookmark pseudo-column. Requires the statement to have been
    /// prepared with `BOOKMARKS=ON`.
    pub fn bind_bookmarks(&mut self) -> Result<()> {
        if !self.bookmarks_enabled {
            return Err(Error::protocol("bookmarks were not enabled at prepare time"));
        }
        let ret = self.stmt.bind_col(0, CTag::Bookmark, BOOKMARK_SIZE);
        check(ret, &*self.stmt, "bind bookmarks")?.data("bind bookmarks")?;
        self.bookmark_bound = true;
        Ok(())
    }

    /// Fetch the next row array. Returns the number of rows materialized,
    /// zero at the end of the resultset.
    pub fn fetch(&mut self) -> Result<usize> {
        self.fetch_scrolled(&Fetch::Next)
    }

    /// Fetch with an explicit orientation.
    pub fn fetch_scrolled(&mut self, fetch: &Fetch) -> Result<usize> {
        let scroll = match fetch {
            Fetch::Next => Scroll::Next,
            Fetch::Prior => Scroll::Prior,
            Fetch::First => Scroll::First,
            Fetch::Last => Scroll::Last,
            Fetch::Absolute(pos) => Scroll::Absolute(
                i64::try_from(*pos)
                    .ok()
                    .and_then(|p| p.checked_add(1))
                    .ok_or(Error::ValueOverflow {
                        what: "fetch position",
                    })?,
            ),
            Fetch::Relative(offset) => Scroll::Relative(*offset),
            Fetch::AtBookmark(bookmark, offset) => Scroll::Bookmark {
                bookmark: bookmark.0.clone(),
                offset: *offset,
            },
        };

        let ret = self.stmt.fetch_scroll(&scroll);
        let rows = match check(ret, &*self.stmt, "fetch")? {
            Flow::NoData => 0,
            Flow::Data(rows) => rows,
            Flow::NeedData(_) => return Err(Error::protocol("unexpected need-data in fetch")),
        };
        self.last_fetch_rows = rows;
        self.bookmarks.clear();

        if rows == 0 {
            for bind in &mut self.binds {
                if let BindKind::Buffer { values, .. } = &mut bind.kind {
                    values.clear();
                }
            }
            return Ok(0);
        }

        self.decode_buffers(rows)?;
        if self.bookmark_bound {
            self.collect_bookmarks(rows)?;
        }
        self.drain_blobs(rows)?;
        Ok(rows)
    }

    /// Slice every driver-filled buffer into per-row values.
    fn decode_buffers(&mut self, rows: usize) -> Result<()> {
        for bind in &mut self.binds {
            let BindKind::Buffer { fetch_type, values } = &mut bind.kind else {
                continue;
            };
            let (data, indicators) = self
                .stmt
                .col_data(bind.column + 1)
                .ok_or_else(|| Error::protocol("fetch filled no buffer for a bound column"))?;
            let elem = fetch_type.elem_size();
            values.clear();
            for row in 0..rows {
                let indicator = *indicators
                    .get(row)
                    .ok_or_else(|| Error::protocol("short indicator buffer"))?;
                let bytes = data
                    .get(row * elem..(row + 1) * elem)
                    .ok_or_else(|| Error::protocol("short column buffer"))?;
                values.push(decode_element(*fetch_type, bytes, indicator)?);
            }
        }
        Ok(())
    }

    fn collect_bookmarks(&mut self, rows: usize) -> Result<()> {
        let (data, indicators) = self
            .stmt
            .col_data(0)
            .ok_or_else(|| Error::protocol("fetch filled no bookmark buffer"))?;
        for row in 0..rows {
            let indicator = *indicators
                .get(row)
                .ok_or_else(|| Error::protocol("short bookmark indicators"))?;
            if indicator == NULL_DATA {
                self.bookmarks.push(None);
                continue;
            }
            let len = usize::try_from(indicator)
                .unwrap_or(BOOKMARK_SIZE)
                .min(BOOKMARK_SIZE);
            let bytes = data
                .get(row * BOOKMARK_SIZE..row * BOOKMARK_SIZE + len)
                .ok_or_else(|| Error::protocol("short bookmark buffer"))?;
            self.bookmarks.push(Some(Bookmark(bytes.to_vec())));
        }
        Ok(())
    }

    /// Drain every blob bind for every materialized row. NULL rows produce
    /// no sink at all.
    fn drain_blobs(&mut self, rows: usize) -> Result<()> {
        if !self.binds.iter().any(|b| matches!(b.kind, BindKind::Blob(_))) {
            return Ok(());
        }
        let multi_row = self.row_array_size > 1;
        for row in 0..rows {
            if multi_row {
                let ret = self.stmt.set_pos(row + 1);
                check(ret, &*self.stmt, "set_pos")?.data("set_pos")?;
            }
            for bind in &mut self.binds {
                let BindKind::Blob(blob) = &mut bind.kind else {
                    continue;
                };
                drain_one_blob(&mut *self.stmt, bind.column + 1, blob, row)?;
            }
        }
        Ok(())
    }

    /// Values materialized for a bound column by the last fetch.
    pub fn column_values(&self, binding: ColumnBinding) -> Result<&[Value]> {
        match self.binds.get(binding.0).map(|b| &b.kind) {
            Some(BindKind::Buffer { values, .. }) => Ok(values),
            Some(BindKind::Blob(_)) => {
                Err(Error::protocol("blob bindings deliver through their sinks"))
            }
            None => Err(Error::protocol("stale column binding")),
        }
    }

    /// Bookmarks of the last fetched row array, one per row, when the
    /// bookmark column is bound.
    pub fn row_bookmarks(&self) -> &[Option<Bookmark>] {
        &self.bookmarks
    }

    /// Fetch forward until the resultset ends, invoking the callback once
    /// per materialized row array. Returns the total row count.
    pub fn fetch_all(
        &mut self,
        mut callback: impl FnMut(&Statement, usize) -> Result<()>,
    ) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let rows = self.fetch()?;
            if rows == 0 {
                return Ok(total);
            }
            total += rows as u64;
            callback(self, rows)?;
        }
    }
}

fn decode_element(fetch_type: FetchType, bytes: &[u8], indicator: isize) -> Result<Value> {
    if indicator == NULL_DATA {
        return Ok(Value::Null);
    }
    match fetch_type {
        FetchType::Text { max_length } => {
            let len = usize::try_from(indicator).unwrap_or(0).min(max_length);
            Ok(Value::Text(
                String::from_utf8_lossy(&bytes[..len]).into_owned(),
            ))
        }
        FetchType::Decimal { .. } => {
            let len = usize::try_from(indicator)
                .unwrap_or(0)
                .min(bytes.len().saturating_sub(1));
            let text = String::from_utf8_lossy(&bytes[..len]);
            Ok(Value::Decimal(text.trim().parse()?))
        }
        other => decode_fixed(other.c_tag(), bytes),
    }
}

/// Pull one row of one blob column through incremental retrieval.
fn drain_one_blob(
    stmt: &mut dyn crate::driver::DriverStatement,
    column: usize,
    blob: &mut FetchBlob,
    row: usize,
) -> Result<()> {
    let kind = blob.kind();
    let mut scratch = [0u8; BLOB_CHUNK];
    // Character retrieval loses one byte per chunk to the terminator.
    let capacity = BLOB_CHUNK - usize::from(kind == BlobKind::Character);
    let c_tag = match kind {
        BlobKind::Binary => CTag::Binary,
        BlobKind::Character => CTag::Char,
    };

    let mut sink: Option<Box<dyn BlobSink>> = None;
    loop {
        let ret = stmt.get_data(column, c_tag, &mut scratch);
        let indicator = match check(ret, &*stmt, "get_data")? {
            Flow::NoData => break,
            Flow::Data(ind) => ind,
            Flow::NeedData(_) => {
                return Err(Error::protocol("unexpected need-data in get_data"))
            }
        };
        if indicator == NULL_DATA {
            // NULL rows never materialize a sink.
            return Ok(());
        }
        let written = if indicator == NO_TOTAL {
            capacity
        } else {
            usize::try_from(indicator).unwrap_or(0).min(capacity)
        };
        if sink.is_none() {
            sink = Some(blob.make_sink(row)?);
        }
        let active = sink
            .as_mut()
            .ok_or_else(|| Error::protocol("blob sink unavailable"))?;
        active.chunk(&scratch[..written])?;
    }

    if let Some(sink) = sink {
        sink.finish()?;
    }
    Ok(())
}
