/// Input parameter binding and execution
///
/// Parameters bind positionally, in strictly increasing order. Scalar
/// execution is the one-row case of vector execution: every column is
/// packed into a single driver buffer of `row_count` elements plus a
/// parallel indicator array, so one execute round trip carries the whole
/// paramset.
///
/// Blob parameters never materialize. They bind with data-at-execution
/// indicators and an echo token; when the driver asks for that token during
/// execute, the pump streams the staged row's source through `put_data` in
/// fixed-size chunks.
use std::collections::VecDeque;

use crate::blob::{InsertBlob, InsertBlobRow};
use crate::driver::{
    len_data_at_exec, CTag, DriverStatement, ParamBuffer, SqlTag, StmtAttr, DATA_AT_EXEC,
    NULL_DATA, PARAM_DIAG_UNAVAILABLE, PARAM_ERROR, PARAM_SUCCESS, PARAM_UNUSED,
};
use crate::error::{check, Error, Flow, Result};
use crate::value::{encode_fixed, Value};

/// Streaming chunk size for the data-at-execution pump.
const BLOB_CHUNK: usize = 4096;

/// One input parameter for an execute.
pub enum Param {
    /// A single value, one per row in scalar execution.
    Value(Value),
    /// One value per paramset row.
    Vector(Vec<Value>),
    /// A blob column streamed at execution time, one source per row.
    Blob(InsertBlob),
}

impl Param {
    pub fn value(v: impl Into<Value>) -> Self {
        Param::Value(v.into())
    }

    pub fn vector<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Param::Vector(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<InsertBlob> for Param {
    fn from(b: InsertBlob) -> Self {
        Param::Blob(b)
    }
}

/// A blob parameter's rows, queued for the execute-time conversation.
/// NULL rows are filtered out at staging time; the driver never asks for
/// them.
struct StagedBlob {
    token: u32,
    rows: VecDeque<InsertBlobRow>,
}

/// Accumulates parameter buffers for one execute.
pub(crate) struct ParamBinder {
    row_count: usize,
    buffers: Vec<ParamBuffer>,
    blobs: Vec<StagedBlob>,
}

impl ParamBinder {
    pub(crate) fn new(row_count: usize) -> Self {
        ParamBinder {
            row_count,
            buffers: Vec::new(),
            blobs: Vec::new(),
        }
    }

    pub(crate) fn param_count(&self) -> usize {
        self.buffers.len()
    }

    /// Stage the next parameter. Positions are assigned in call order.
    pub(crate) fn add(&mut self, param: Param) -> Result<()> {
        let position = self.buffers.len() + 1;
        let buffer = match param {
            Param::Value(v) => {
                let values = [v];
                self.build_column(position, &values)?
            }
            Param::Vector(values) => self.build_column(position, &values)?,
            Param::Blob(blob) => self.build_blob(position, blob)?,
        };
        self.buffers.push(buffer);
        Ok(())
    }

    fn check_rows(&self, position: usize, actual: usize) -> Result<()> {
        if actual != self.row_count {
            return Err(Error::RowCountMismatch {
                position,
                expected: self.row_count,
                actual,
            });
        }
        Ok(())
    }

    fn build_column(&self, position: usize, values: &[Value]) -> Result<ParamBuffer> {
        self.check_rows(position, values.len())?;

        let Some(first) = values.iter().find(|v| !v.is_null()) else {
            // An all-NULL column carries no data, only indicators; the
            // declared type is immaterial.
            return Ok(ParamBuffer {
                c_tag: CTag::Char,
                sql_tag: SqlTag::Varchar,
                column_size: 1,
                decimal_digits: 0,
                elem_size: 1,
                data: vec![0; values.len()],
                indicators: vec![NULL_DATA; values.len()],
                exec_token: None,
            });
        };

        let c_tag = first.c_tag().ok_or_else(|| Error::protocol("untagged value"))?;
        let mut sql_tag = first.sql_tag().ok_or_else(|| Error::protocol("untagged value"))?;
        for v in values {
            match v.c_tag() {
                None => {}
                Some(t) if t == c_tag => {
                    // A row whose sign bit trips the per-value promotion
                    // widens the whole column's SQL type.
                    if let Some(t) = v.sql_tag() {
                        if sql_rank(t) > sql_rank(sql_tag) {
                            sql_tag = t;
                        }
                    }
                }
                Some(t) => {
                    return Err(Error::protocol(format!(
                        "parameter {position} mixes buffer types {c_tag:?} and {t:?}"
                    )));
                }
            }
        }

        if c_tag == CTag::Char {
            return Ok(self.build_text_column(values, sql_tag));
        }

        let elem_size = c_tag.fixed_size();
        let mut data = Vec::with_capacity(elem_size * values.len());
        let mut indicators = Vec::with_capacity(values.len());
        for v in values {
            indicators.push(encode_fixed(v, c_tag, &mut data)?);
        }
        Ok(ParamBuffer {
            c_tag,
            sql_tag,
            column_size: 0,
            decimal_digits: 0,
            elem_size,
            data,
            indicators,
            exec_token: None,
        })
    }

    /// Strings and decimals pack into one buffer of the widest row's size;
    /// shorter rows are zero padded and sized by their indicator.
    fn build_text_column(&self, values: &[Value], sql_tag: SqlTag) -> ParamBuffer {
        let width = values
            .iter()
            .filter_map(Value::as_text)
            .map(str::len)
            .max()
            .unwrap_or(0)
            .max(1);

        let mut data = vec![0u8; width * values.len()];
        let mut indicators = Vec::with_capacity(values.len());
        for (row, v) in values.iter().enumerate() {
            match v.as_text() {
                Some(text) => {
                    data[row * width..row * width + text.len()].copy_from_slice(text.as_bytes());
                    indicators.push(text.len() as isize);
                }
                None => indicators.push(NULL_DATA),
            }
        }
        ParamBuffer {
            c_tag: CTag::Char,
            sql_tag,
            column_size: width,
            decimal_digits: 0,
            elem_size: width,
            data,
            indicators,
            exec_token: None,
        }
    }

    fn build_blob(&mut self, position: usize, blob: InsertBlob) -> Result<ParamBuffer> {
        self.check_rows(position, blob.row_count())?;

        let (c_tag, sql_tag) = match blob.kind() {
            crate::blob::BlobKind::Binary => (CTag::Binary, SqlTag::LongVarbinary),
            crate::blob::BlobKind::Character => (CTag::Char, SqlTag::LongVarchar),
        };

        let token = position as u32;
        let mut indicators = Vec::with_capacity(self.row_count);
        let mut staged = VecDeque::new();
        for row in blob.into_rows() {
            match row {
                None => indicators.push(NULL_DATA),
                Some(row) => {
                    indicators.push(match row.length {
                        Some(length) => {
                            InsertBlob::check_length(length)?;
                            len_data_at_exec(length as isize)
                        }
                        None => DATA_AT_EXEC,
                    });
                    staged.push_back(row);
                }
            }
        }
        self.blobs.push(StagedBlob { token, rows: staged });

        Ok(ParamBuffer {
            c_tag,
            sql_tag,
            column_size: 0,
            decimal_digits: 0,
            elem_size: 0,
            data: Vec::new(),
            indicators,
            exec_token: Some(token),
        })
    }

    /// Bind every staged buffer and run the execute, pumping blob chunks
    /// whenever the driver asks for a token. Returns per-row statuses:
    /// 0 error, 1 success, 2 skipped, 3 success with modification. The low
    /// bit always means the row is fine.
    pub(crate) fn execute(mut self, stmt: &mut dyn DriverStatement) -> Result<Vec<u8>> {
        let ret = stmt.num_params();
        let expected = check(ret, &*stmt, "num_params")?.data("num_params")?;
        if expected != self.buffers.len() {
            return Err(Error::ParameterCountMismatch {
                expected,
                bound: self.buffers.len(),
            });
        }

        let ret = stmt.set_attr(StmtAttr::ParamsetSize(self.row_count));
        check(ret, &*stmt, "paramset size")?.data("paramset size")?;

        for (i, buffer) in self.buffers.drain(..).enumerate() {
            let ret = stmt.bind_parameter(i + 1, buffer);
            check(ret, &*stmt, "bind_parameter")?.data("bind_parameter")?;
        }

        let result = self.run(stmt);
        if result.is_err() {
            // Abandon the half-fed execute so the statement is reusable.
            let ret = stmt.cancel();
            if let Err(e) = check(ret, &*stmt, "cancel").map(|_| ()) {
                tracing::warn!("cancel after failed execute: {e}");
            }
        }
        result?;

        Ok(transform_statuses(
            &stmt.param_statuses(),
            stmt.params_processed(),
            self.row_count,
        ))
    }

    fn run(&mut self, stmt: &mut dyn DriverStatement) -> Result<()> {
        let ret = stmt.execute();
        let mut flow = check(ret, &*stmt, "execute")?;
        while let Flow::NeedData(token) = flow {
            self.feed_one(stmt, token)?;
            let ret = stmt.param_data();
            flow = check(ret, &*stmt, "param_data")?;
        }
        Ok(())
    }

    /// Stream one staged blob row for the named token.
    fn feed_one(&mut self, stmt: &mut dyn DriverStatement, token: u32) -> Result<()> {
        let staged = self
            .blobs
            .iter_mut()
            .find(|b| b.token == token)
            .ok_or_else(|| Error::protocol(format!("driver asked for unknown token {token}")))?;
        let mut row = staged.rows.pop_front().ok_or_else(|| {
            Error::protocol(format!("driver asked for exhausted token {token}"))
        })?;

        let mut scratch = [0u8; BLOB_CHUNK];
        let mut sent = false;
        loop {
            let n = row.source.fill(&mut scratch)?;
            if n == 0 {
                if !sent {
                    // An empty blob still needs one put_data to close the row.
                    let ret = stmt.put_data(&[]);
                    check(ret, &*stmt, "put_data")?.data("put_data")?;
                }
                return Ok(());
            }
            sent = true;
            let ret = stmt.put_data(&scratch[..n]);
            check(ret, &*stmt, "put_data")?.data("put_data")?;
        }
    }
}

/// Width ordering of the SQL integer ladder, for column-wide promotion.
/// Unrelated tags rank equal so they never displace one another.
fn sql_rank(tag: SqlTag) -> u8 {
    match tag {
        SqlTag::Bit => 0,
        SqlTag::TinyInt => 1,
        SqlTag::SmallInt => 2,
        SqlTag::Integer => 3,
        SqlTag::BigInt => 4,
        SqlTag::Numeric => 5,
        SqlTag::Real
        | SqlTag::Double
        | SqlTag::Varchar
        | SqlTag::LongVarchar
        | SqlTag::LongVarbinary
        | SqlTag::Date
        | SqlTag::Time => 0,
    }
}

/// Collapse raw driver statuses into the engine's row outcomes. Rows the
/// driver never reported on count as processed up to `processed`, skipped
/// past it.
fn transform_statuses(raw: &[u16], processed: usize, row_count: usize) -> Vec<u8> {
    (0..row_count)
        .map(|row| match raw.get(row) {
            Some(&PARAM_ERROR) => 0,
            Some(&PARAM_SUCCESS) | Some(&PARAM_DIAG_UNAVAILABLE) => 1,
            Some(&PARAM_UNUSED) => 2,
            Some(_) => 3,
            None => u8::from(row >= processed) + 1,
        })
        .collect()
}

/// Fail on the first row whose status is not an OK outcome. Scalar
/// execution applies this to its single row.
pub(crate) fn verify_statuses(statuses: &[u8]) -> Result<()> {
    for (row, &status) in statuses.iter().enumerate() {
        if status & 1 == 0 {
            return Err(Error::RowFailed { row, status });
        }
    }
    Ok(())
}
