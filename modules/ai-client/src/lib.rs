pub mod claude;
pub mod error;
pub mod util;

pub use claude::Claude;
pub use error::{AiError, Result};
pub use util::{flatten_newlines, truncate_chars};
