//! Offset/limit windows for listings

use super::error::LedgerError;

/// Validated listing window
///
/// Built from the boundary's signed `(offset, limit)` pair where a limit of
/// `-1` means "no limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Page {
    /// Every row, from the beginning
    pub const ALL: Page = Page {
        offset: 0,
        limit: None,
    };

    /// Limit value that disables the row cap
    pub const UNBOUNDED: i64 = -1;

    /// Validate a signed offset/limit pair
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::OffsetLimitInvalid` when `offset` is negative or
    /// `limit` is below `-1`.
    pub fn new(offset: i64, limit: i64) -> Result<Self, LedgerError> {
        if offset < 0 || limit < Self::UNBOUNDED {
            return Err(LedgerError::OffsetLimitInvalid { offset, limit });
        }
        Ok(Self {
            offset: offset as u64,
            limit: (limit != Self::UNBOUNDED).then_some(limit as u64),
        })
    }

    /// A window of at most `limit` rows starting at `offset`
    pub fn bounded(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Copy the rows of `items` that fall inside this window
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let rows = items.get(start..).unwrap_or_default();
        match self.limit {
            Some(limit) => {
                let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                rows.iter().take(limit).cloned().collect()
            }
            None => rows.to_vec(),
        }
    }
}
