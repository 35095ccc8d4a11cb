pub mod state;

pub use state::{format_remaining, ExamTimer};
