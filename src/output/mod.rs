//! Summary log persistence and the offline text formatter.

mod format;
mod jsonl;

pub use format::{DEFAULT_WRAP, convert_file, render_for_phone, wrap_text};
pub use jsonl::{append_jsonl, read_jsonl};
