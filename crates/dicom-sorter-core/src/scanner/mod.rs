pub mod classify;
pub mod extract;
pub mod walk;

pub use classify::classify_all;
pub use extract::{extract_all, ExtractedArchive};
pub use walk::Discovery;
