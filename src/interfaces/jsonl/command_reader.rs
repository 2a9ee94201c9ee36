use crate::application::command::Request;
use crate::error::{MarketError, Result};
use std::io::BufRead;

/// Reads engine requests from a JSON Lines source.
///
/// Blank lines and lines starting with `#` are skipped. A line that does not
/// parse yields a `BadRequest` for that line only; the stream continues.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    /// Creates a new `CommandReader` from any buffered source (e.g. a `BufReader<File>`).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses the stream, pairing each request with its 1-based line number.
    pub fn requests(self) -> impl Iterator<Item = (usize, Result<Request>)> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let number = index + 1;
                match line {
                    Err(err) => Some((number, Err(MarketError::from(err)))),
                    Ok(text) => {
                        let text = text.trim();
                        if text.is_empty() || text.starts_with('#') {
                            None
                        } else {
                            Some((number, parse(number, text)))
                        }
                    }
                }
            })
    }
}

fn parse(number: usize, text: &str) -> Result<Request> {
    serde_json::from_str(text)
        .map_err(|err| MarketError::BadRequest(format!("line {number}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command::Command;

    #[test]
    fn test_reader_skips_comments_and_blanks() {
        let data = concat!(
            "# setup\n\n",
            r#"{"op":"payment_history","actor":"8c1f7d8e-3f67-4b3c-9a56-3e7c0f1d2a11"}"#,
            "\n   \n"
        );
        let results: Vec<_> = CommandReader::new(data.as_bytes()).requests().collect();

        assert_eq!(results.len(), 1);
        let (line, request) = &results[0];
        assert_eq!(*line, 3);
        assert!(matches!(
            request.as_ref().unwrap().command,
            Command::PaymentHistory {}
        ));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{\"op\":\"payment_history\"}\nnot json\n{\"op\":\"list_invoices\"}";
        let results: Vec<_> = CommandReader::new(data.as_bytes()).requests().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        match &results[1].1 {
            Err(MarketError::BadRequest(message)) => assert!(message.starts_with("line 2:")),
            other => panic!("expected a bad request, got {other:?}"),
        }
        assert!(results[2].1.is_ok());
    }
}
