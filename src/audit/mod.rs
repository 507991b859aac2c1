pub mod logger;
pub mod reader;
pub mod types;

pub use logger::Journal;
pub use reader::JournalReader;
pub use types::*;
