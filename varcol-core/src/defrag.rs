use bon::Builder;
use tracing::{debug, warn};

use crate::error::ColumnError;
use crate::substrate::{ColumnSchema, StorageSubstrate};

/// Defragments every segment holding live data.
pub const MOST_AGGRESSIVE_THRESHOLD: i32 = -4;
/// Defragments nothing.
pub const LEAST_AGGRESSIVE_THRESHOLD: i32 = 22;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Builder)]
/// Options for a defrag pass over a column.
pub struct DefragOptions {
    #[builder(default)]
    /// How sparse a segment must be to be compacted.
    ///
    /// Lower values select more segments. The useful range is
    /// [MOST_AGGRESSIVE_THRESHOLD] to [LEAST_AGGRESSIVE_THRESHOLD], values
    /// outside it are passed to the substrate unchanged.
    pub threshold: i32,
}

impl DefragOptions {
    pub fn with_threshold(threshold: i32) -> Self {
        Self { threshold }
    }
}

/// Asks the substrate to compact the segments of `column`.
///
/// Returns the number of segments reclaimed.
pub fn defrag<S>(
    substrate: &S,
    column: &ColumnSchema,
    options: DefragOptions,
) -> Result<u32, ColumnError>
where
    S: StorageSubstrate + ?Sized,
{
    let threshold = options.threshold;
    if !(MOST_AGGRESSIVE_THRESHOLD..=LEAST_AGGRESSIVE_THRESHOLD).contains(&threshold) {
        warn!(column = %column.name, threshold, "Defrag threshold is outside of the usual range");
    }

    let reclaimed = substrate
        .defrag(column.id, threshold)
        .map_err(|source| ColumnError::Storage {
            operation: "defrag",
            column: column.name.clone(),
            source,
        })?;

    debug!(column = %column.name, threshold, reclaimed, "Defrag complete");
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_threshold() {
        assert_eq!(DefragOptions::default().threshold, 0);
        assert_eq!(DefragOptions::builder().build().threshold, 0);
        assert_eq!(
            DefragOptions::builder().threshold(-4).build(),
            DefragOptions::with_threshold(MOST_AGGRESSIVE_THRESHOLD)
        );
    }
}
