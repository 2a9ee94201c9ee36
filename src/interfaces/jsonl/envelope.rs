use crate::error::{ErrorKind, MarketError, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
    pub existing_id: Option<Uuid>,
    pub retriable: bool,
}

/// The response line written for every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &MarketError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                code: err.code(),
                message: err.to_string(),
                existing_id: err.existing_id(),
                retriable: err.is_retriable(),
            }),
        }
    }
}

impl From<Result<Value>> for Envelope {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(err) => Envelope::failure(&err),
        }
    }
}

/// Writes one JSON envelope per line.
pub struct EnvelopeWriter<W: Write> {
    sink: W,
}

impl<W: Write> EnvelopeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write(&mut self, envelope: &Envelope) -> Result<()> {
        serde_json::to_writer(&mut self.sink, envelope)?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}
