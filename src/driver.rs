/// Native driver boundary
///
/// The engine sits on top of a unixODBC-style driver manager. This module is
/// the whole of that boundary: handle-oriented traits for the environment,
/// connection and statement levels, the buffer-protocol types the marshalling
/// layers speak (type tags, indicators, parameter buffers), and the
/// diagnostic record format every failure carries.
///
/// Everything above this module is driver-agnostic; the test suite plugs in
/// an in-memory driver through the same traits.
use std::time::Duration;

/// Indicator value for a NULL parameter or column.
pub const NULL_DATA: isize = -1;

/// Indicator value for a data-at-execution parameter of unknown length.
pub const DATA_AT_EXEC: isize = -2;

/// Indicator value when the driver cannot report a blob's remaining length.
pub const NO_TOTAL: isize = -4;

/// Offset for encoding a known length into a data-at-execution indicator.
pub const LEN_DATA_AT_EXEC_OFFSET: isize = -100;

/// Encode a known blob length as a data-at-execution indicator.
pub fn len_data_at_exec(length: isize) -> isize {
    -length + LEN_DATA_AT_EXEC_OFFSET
}

/// Raw per-row parameter status values, as the driver reports them.
pub const PARAM_SUCCESS: u16 = 0;
pub const PARAM_DIAG_UNAVAILABLE: u16 = 1;
pub const PARAM_ERROR: u16 = 5;
pub const PARAM_SUCCESS_WITH_INFO: u16 = 6;
pub const PARAM_UNUSED: u16 = 7;

/// One diagnostic record: a five-character SQLSTATE, the vendor's native
/// error number, and the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub sqlstate: String,
    pub native: i32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(sqlstate: &str, native: i32, message: impl Into<String>) -> Self {
        Diagnostic {
            sqlstate: sqlstate.to_string(),
            native,
            message: message.into(),
        }
    }
}

/// Completion of one native call.
///
/// `Info` is success with pending warning diagnostics on the handle.
/// `NeedData` carries the token of the data-at-execution parameter the
/// driver wants next.
#[derive(Debug)]
pub enum Return<T> {
    Success(T),
    Info(T),
    NoData,
    NeedData(u32),
    Error,
}

/// C-level buffer type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CTag {
    Bit,
    STinyInt,
    UTinyInt,
    SShort,
    UShort,
    SLong,
    ULong,
    SBigInt,
    UBigInt,
    Float,
    Double,
    Char,
    Binary,
    Date,
    Time,
    Bookmark,
}

impl CTag {
    /// Fixed per-element buffer width, zero for the variable-length tags.
    pub fn fixed_size(self) -> usize {
        match self {
            CTag::Bit | CTag::STinyInt | CTag::UTinyInt => 1,
            CTag::SShort | CTag::UShort => 2,
            CTag::SLong | CTag::ULong | CTag::Float => 4,
            CTag::SBigInt | CTag::UBigInt | CTag::Double => 8,
            CTag::Date | CTag::Time => 6,
            CTag::Char | CTag::Binary | CTag::Bookmark => 0,
        }
    }
}

/// SQL-level type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTag {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Numeric,
    Real,
    Double,
    Varchar,
    LongVarchar,
    LongVarbinary,
    Date,
    Time,
}

/// Cursor behavior requested through the `CURSOR_TYPE` statement option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    ForwardOnly,
    Static,
    Dynamic,
    Keyset(u32),
}

/// Settable statement attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtAttr {
    RowArraySize(usize),
    ParamsetSize(usize),
    MaxRows(u64),
    CursorType(CursorType),
    Bookmarks(bool),
    CursorName(String),
}

/// Driver-level scroll request. Absolute positions here are 1-based; the
/// public fetch surface translates from its 0-based convention.
#[derive(Debug, Clone)]
pub enum Scroll {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
    Bookmark { bookmark: Vec<u8>, offset: i64 },
}

/// A fully staged input parameter, handed to the driver at bind time.
///
/// For ordinary parameters `data` holds `indicators.len()` elements of
/// `elem_size` bytes each. Data-at-execution parameters leave `data` empty
/// and carry an `exec_token` the driver echoes back through
/// [`DriverStatement::param_data`].
#[derive(Debug, Clone)]
pub struct ParamBuffer {
    pub c_tag: CTag,
    pub sql_tag: SqlTag,
    pub column_size: usize,
    pub decimal_digits: i16,
    pub elem_size: usize,
    pub data: Vec<u8>,
    pub indicators: Vec<isize>,
    pub exec_token: Option<u32>,
}

/// Descriptive metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_tag: SqlTag,
    pub size: usize,
    pub scale: i16,
    pub nullable: bool,
}

/// Anything that can produce its pending diagnostic records.
pub trait Diagnosable {
    /// Retrieve and clear the diagnostics accumulated by the last call.
    fn diagnostics(&self) -> Vec<Diagnostic>;
}

/// Environment-level driver entry point.
pub trait Driver: Diagnosable + Send + Sync {
    /// Connect with a validated connection string. Returns the connection
    /// and the completed connection string the driver reports back.
    fn connect(
        &self,
        connection_string: &str,
        login_timeout: Option<Duration>,
    ) -> Return<(Box<dyn DriverConnection>, String)>;
}

/// One open connection at the driver level.
pub trait DriverConnection: Diagnosable + Send {
    fn prepare(&mut self, sql: &str) -> Return<Box<dyn DriverStatement>>;

    fn set_autocommit(&mut self, on: bool) -> Return<()>;
    fn commit(&mut self) -> Return<()>;
    fn rollback(&mut self) -> Return<()>;

    /// Translate SQL into the driver's native form.
    fn native_sql(&mut self, sql: &str) -> Return<String>;

    fn disconnect(&mut self) -> Return<()>;

    /// Catalog enumerations. `literal_ids` requests literal (non-pattern)
    /// identifier matching.
    fn tables(
        &mut self,
        literal_ids: bool,
        catalog: &str,
        schema: &str,
        table: &str,
        table_type: &str,
    ) -> Return<Box<dyn DriverStatement>>;

    fn columns(
        &mut self,
        literal_ids: bool,
        catalog: &str,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Return<Box<dyn DriverStatement>>;

    fn primary_keys(
        &mut self,
        literal_ids: bool,
        table: &str,
        catalog: &str,
        schema: &str,
    ) -> Return<Box<dyn DriverStatement>>;
}

/// One prepared statement at the driver level.
///
/// Bound output columns are owned by the driver between `bind_col` and
/// `unbind_cols`; after a fetch the engine reads the filled buffers back
/// through `col_data` and does its own slicing and decoding.
pub trait DriverStatement: Diagnosable + Send {
    fn set_attr(&mut self, attr: StmtAttr) -> Return<()>;

    /// Current cursor name, generating one if none was set.
    fn cursor_name(&mut self) -> Return<String>;

    fn num_params(&mut self) -> Return<usize>;
    fn num_result_cols(&mut self) -> Return<usize>;

    /// Describe a result column, 1-based.
    fn describe_col(&mut self, column: usize) -> Return<ColumnMeta>;

    /// Bind an input parameter, 1-based position.
    fn bind_parameter(&mut self, position: usize, buffer: ParamBuffer) -> Return<()>;
    fn reset_parameters(&mut self) -> Return<()>;

    fn execute(&mut self) -> Return<()>;

    /// Advance the data-at-execution conversation. `NeedData` names the
    /// next parameter wanting chunks; `Success` means execution finished.
    fn param_data(&mut self) -> Return<()>;
    fn put_data(&mut self, chunk: &[u8]) -> Return<()>;

    fn cancel(&mut self) -> Return<()>;

    /// Number of parameter rows the last execute processed.
    fn params_processed(&self) -> usize;

    /// Raw per-row parameter statuses from the last execute.
    fn param_statuses(&self) -> Vec<u16>;

    /// Bind an output column, 1-based; column 0 binds the bookmark column.
    /// The driver allocates `elem_size × row-array-size` bytes plus one
    /// indicator per row.
    fn bind_col(&mut self, column: usize, c_tag: CTag, elem_size: usize) -> Return<()>;
    fn unbind_cols(&mut self) -> Return<()>;

    /// Fetch the next row array; returns the number of rows fetched.
    fn fetch_scroll(&mut self, scroll: &Scroll) -> Return<usize>;

    /// Buffers filled by the last fetch for a bound column (data, indicators).
    fn col_data(&self, column: usize) -> Option<(&[u8], &[isize])>;

    /// Incremental retrieval for unbound (blob) columns. The returned value
    /// is the indicator: bytes remaining before this call, `NULL_DATA`, or
    /// `NO_TOTAL`. `NoData` once the column is exhausted.
    fn get_data(&mut self, column: usize, c_tag: CTag, buf: &mut [u8]) -> Return<isize>;

    /// Position within the last fetched row array, 1-based.
    fn set_pos(&mut self, row: usize) -> Return<()>;

    /// Advance to the next resultset of a batch. `NoData` when exhausted.
    fn more_results(&mut self) -> Return<()>;

    fn row_count(&mut self) -> Return<i64>;
}
