use thiserror::Error;

#[derive(Debug, Error)]
pub enum RerouterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch {url}: status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("empty sitemap: {0}")]
    EmptySitemap(String),

    #[error("unrecognized sitemap format: {0}")]
    UnrecognizedSitemap(String),

    #[error("gzip decode {url}: {source}")]
    Gzip {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty target")]
    EmptyTarget,

    #[error("{0} required")]
    MissingField(&'static str),

    #[error("deadline exceeded: {0}")]
    Deadline(String),
}

impl RerouterError {
    pub fn invalid_url(url: &str, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RerouterError>;
