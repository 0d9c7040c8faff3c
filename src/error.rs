use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum RepoError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to update data")]
    Update,
    #[display("failed to query data")]
    Query,
    #[display("stored row is malformed: {column}")]
    RowDecode { column: String },
}

#[derive(Debug, Display, Error)]
pub enum MarketError {
    #[display("failed to initialize market data client")]
    ClientInit,
    #[display("market data request failed for {symbol}")]
    Request { symbol: String },
    #[display("failed to parse market data response for {symbol}")]
    ResponseParse { symbol: String },
    #[display("no quote available for {symbol}")]
    NoQuote { symbol: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum SenderError {
    #[display("no sender registered for method {method}")]
    UnsupportedMethod { method: String },
    #[display("delivery to {recipient} failed")]
    Delivery { recipient: String },
    #[display("delivery to {recipient} timed out")]
    Timeout { recipient: String },
}

impl SenderError {
    /// Terminal errors are not retried; the queue entry goes straight to
    /// `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UnsupportedMethod { .. })
    }
}
