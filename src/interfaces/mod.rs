//! Adapters between the outside world and the engine: the JSONL command
//! stream, the CSV payment export and the user seed file.

pub mod csv;
pub mod jsonl;
pub mod seed;
