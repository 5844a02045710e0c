//! Context assembly for the generator prompt.

use crate::document::RetrievalResult;

/// Separator placed between retrieved chunk texts.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Join retrieved chunk texts in retrieval order.
pub fn assemble(retrieved: &RetrievalResult) -> String {
    retrieved.texts().collect::<Vec<_>>().join(CONTEXT_DELIMITER)
}
