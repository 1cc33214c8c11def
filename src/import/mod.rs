mod bulk;
mod parser;

pub use bulk::{BulkAddResult, BulkImportEngine, FailedRow, ImportUndoToken, DEFAULT_BATCH_SIZE};
pub use parser::{parse_import, ImportLimits, ImportRow, InvalidRow, ParsedImport};
