use thiserror::Error;

/// Errors raised outside the render path (persistence, configuration,
/// structural edits). The render path itself never fails.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a `{expected}` record, found `{found}`")]
    WrongRecordType { expected: String, found: String },

    #[error("a group can hold at most {max} child synths")]
    TooManyChildren { max: usize },

    #[error("child synth `{0}` is not compatible with the group")]
    IncompatibleChild(String),

    #[error("no child synth with id {0}")]
    UnknownChild(u32),

    #[error("unknown routing preset `{0}`")]
    UnknownPreset(String),
}

pub type Result<T> = std::result::Result<T, Error>;
