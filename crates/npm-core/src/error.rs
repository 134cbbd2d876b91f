//! Error taxonomy. Parse errors are the only ones that ever surface as
//! `Result::Err` — invalid access, unauthorized access, and compliance
//! findings are recorded into the Statistics/Compliance structures instead
//! (§7), so they never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NpmError {
    #[error("malformed NLP line {line}: {text:?} does not match the expected grammar")]
    MalformedLine { line: usize, text: String },

    #[error("NLP file section {0} is missing")]
    MissingSection(&'static str),

    #[error("unknown register kind letter {0:?}")]
    UnknownRegKind(char),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
