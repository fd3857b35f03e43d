use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

impl TransportError {
    /// Timeouts, connection drops, 429 and 5xx are worth another attempt.
    /// Any other 4xx means the session or the query itself is bad.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::ConnectionFailed(_) => true,
            TransportError::HttpStatus(429) => true,
            TransportError::HttpStatus(code) => (500..600).contains(code),
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed JSON in response: {0}")]
    MalformedJson(String),

    #[error("unexpected response schema: {0}")]
    UnexpectedSchema(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ScrapeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}
