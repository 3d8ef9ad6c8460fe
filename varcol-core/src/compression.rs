use crate::types::{ColumnFlags, CompressionType};

/// Reports whether a column is compressed, optionally with a specific scheme.
///
/// With no `requested` scheme any configured compression counts. A
/// requested scheme which differs from the configured one reports `false`
/// without consulting `supported`. Otherwise the answer is whatever `supported`
/// says about the configured scheme being available in the substrate.
pub fn compression_state<F>(
    flags: ColumnFlags,
    requested: Option<CompressionType>,
    supported: F,
) -> bool
where
    F: FnOnce(CompressionType) -> bool,
{
    let configured = flags.compression();
    if configured == CompressionType::None {
        return false;
    }

    match requested {
        Some(requested) if requested != configured => false,
        _ => supported(configured),
    }
}
