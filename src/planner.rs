//! Batch boundary arithmetic.
//!
//! [`should_flush`] is a pure function of the current batch fill, the batch
//! index and the run totals, so it can be tested in isolation from any I/O.

/// Totals derived from the data row count and batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub total_data_rows: u64,
    pub batch_size: u64,
    /// Batches holding exactly `batch_size` rows
    pub full_batches: u64,
    /// Rows in the trailing partial batch (zero when there is none)
    pub remainder: u64,
}

impl BatchPlan {
    pub fn new(total_data_rows: u64, batch_size: u64) -> Self {
        let (full_batches, remainder) = if batch_size == 0 {
            (0, total_data_rows)
        } else {
            (total_data_rows / batch_size, total_data_rows % batch_size)
        };

        Self {
            total_data_rows,
            batch_size,
            full_batches,
            remainder,
        }
    }

    /// Number of batches the run will dispatch
    pub fn batch_count(&self) -> u64 {
        self.full_batches + u64::from(self.remainder > 0)
    }
}

/// Whether the batch at `batch_index` (0-based, i.e. batches already
/// dispatched) is complete after holding `rows_in_current_batch` rows.
///
/// Fires when any of these holds:
/// - the whole file fits in one batch and all of it is present
/// - a batch before the last full batch boundary reached `batch_size`
/// - the trailing partial batch reached `total_data_rows % batch_size`
pub fn should_flush(
    rows_in_current_batch: u64,
    batch_index: u64,
    total_data_rows: u64,
    batch_size: u64,
) -> bool {
    if batch_size == 0 || rows_in_current_batch == 0 {
        return false;
    }

    let full_batches = total_data_rows / batch_size;
    let remainder = total_data_rows % batch_size;

    let single_batch_complete =
        total_data_rows < batch_size && rows_in_current_batch == total_data_rows;
    let full_batch_complete = batch_index < full_batches && rows_in_current_batch == batch_size;
    let final_partial_complete =
        batch_index == full_batches && remainder > 0 && rows_in_current_batch == remainder;

    single_batch_complete || full_batch_complete || final_partial_complete
}
