//! Splitting work into bounded groups.

use crate::error::TrackError;

/// Split `items` into consecutive groups of at most `max_len` elements.
///
/// Every group has exactly `max_len` elements except possibly the last.
/// An empty slice yields no groups.
pub fn partition<T>(items: &[T], max_len: usize) -> Result<std::slice::Chunks<'_, T>, TrackError> {
    if max_len == 0 {
        return Err(TrackError::InvalidConfig {
            message: "Partition length must be greater than zero".to_string(),
        });
    }
    Ok(items.chunks(max_len))
}
