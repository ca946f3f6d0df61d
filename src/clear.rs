//! Destination table clearing with retry-then-verify semantics.
//!
//! The store's listing call returns one bounded page, so "table empty" can
//! never be inferred from a single call; each round deletes the visible page
//! and re-lists. A round that makes no progress is verified once more before
//! the run is reported as blocked.

use crate::error::Result;
use crate::seatable::SeaTableClient;
use tracing::{debug, info, warn};

/// Pages above this size get the larger delete chunk cap.
const LARGE_PAGE_THRESHOLD: usize = 500;
/// Delete chunk cap when the visible page is large.
const LARGE_PAGE_CHUNK_CAP: usize = 200;
/// Delete chunk cap for ordinary pages.
const SMALL_PAGE_CHUNK_CAP: usize = 100;

/// Result of deleting one chunk of row ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Every row in the chunk was deleted
    Deleted(usize),
    /// The batch call failed and the per-row fallback left failures behind
    PartialFailure {
        /// Rows the fallback did delete
        deleted: usize,
        /// Rows that could not be deleted
        failed_ids: Vec<String>,
    },
}

/// Terminal state of one clearing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The table was verified empty
    Cleared {
        /// Delete rounds executed
        rounds: usize,
        /// Rows deleted in total
        deleted: usize,
    },
    /// A round made no progress and rows remain visible — typically a
    /// permission problem or a store-side error
    Blocked {
        /// Rows deleted before progress stopped
        deleted: usize,
        /// Rows still visible on the verification listing
        remaining: usize,
    },
}

impl ClearOutcome {
    /// Whether the table ended up verifiably empty.
    pub fn is_cleared(&self) -> bool {
        matches!(self, ClearOutcome::Cleared { .. })
    }
}

/// Drive the destination table to an empty state.
///
/// `chunk_size` bounds the delete batches, further capped per round by the
/// store payload limits. Per-row failures never abort a round on their own;
/// only a zero-progress round that still shows rows ends the run as
/// [`ClearOutcome::Blocked`].
pub async fn clear_table(
    store: &SeaTableClient,
    table: &str,
    chunk_size: usize,
) -> Result<ClearOutcome> {
    info!("Clearing table '{}'...", table);

    let mut rounds = 0usize;
    let mut total_deleted = 0usize;
    let mut failed_rows: Vec<String> = Vec::new();

    loop {
        let rows = store.list_rows(table).await?;
        if rows.is_empty() {
            info!(
                "Table '{}' is empty. Rounds: {}, rows deleted: {}",
                table, rounds, total_deleted
            );
            return Ok(ClearOutcome::Cleared {
                rounds,
                deleted: total_deleted,
            });
        }

        rounds += 1;
        let page_len = rows.len();
        let delete_chunk = round_chunk_size(page_len, chunk_size);
        debug!(
            "Round {}: {} visible rows, deleting in chunks of {}",
            rounds, page_len, delete_chunk
        );

        let row_ids: Vec<String> = rows.into_iter().map(|r| r.id).collect();
        let mut deleted_this_round = 0usize;

        for chunk in row_ids.chunks(delete_chunk) {
            match delete_chunk_rows(store, table, chunk).await {
                DeleteOutcome::Deleted(n) => deleted_this_round += n,
                DeleteOutcome::PartialFailure { deleted, failed_ids } => {
                    deleted_this_round += deleted;
                    failed_rows.extend(failed_ids);
                }
            }
        }

        total_deleted += deleted_this_round;
        debug!(
            "Round {}: deleted {} rows (total {})",
            rounds, deleted_this_round, total_deleted
        );

        if deleted_this_round == 0 {
            // No progress. A stale page can still mean success; anything
            // else is unrecoverable from here.
            let remaining = store.list_rows(table).await?.len();
            if remaining == 0 {
                return Ok(ClearOutcome::Cleared {
                    rounds,
                    deleted: total_deleted,
                });
            }
            warn!(
                "No rows deleted in round {} and {} rows remain in '{}' ({} failed deletes so far)",
                rounds,
                remaining,
                table,
                failed_rows.len()
            );
            return Ok(ClearOutcome::Blocked {
                deleted: total_deleted,
                remaining,
            });
        }

        if !failed_rows.is_empty() {
            warn!(
                "{} rows failed to delete so far; continuing with the next listing",
                failed_rows.len()
            );
        }
    }
}

/// Chunk size for one delete round given the visible page size.
fn round_chunk_size(page_len: usize, chunk_size: usize) -> usize {
    if page_len > LARGE_PAGE_THRESHOLD {
        chunk_size.min(LARGE_PAGE_CHUNK_CAP)
    } else {
        chunk_size.min(SMALL_PAGE_CHUNK_CAP)
    }
}

/// Delete one chunk: batch call first, per-row fallback when it fails.
async fn delete_chunk_rows(store: &SeaTableClient, table: &str, ids: &[String]) -> DeleteOutcome {
    match store.batch_delete_rows(table, ids).await {
        Ok(()) => DeleteOutcome::Deleted(ids.len()),
        Err(e) => {
            warn!(
                "Batch delete of {} rows failed, falling back to single deletes: {}",
                ids.len(),
                e
            );

            let mut deleted = 0usize;
            let mut failed_ids = Vec::new();
            for id in ids {
                match store.delete_row(table, id).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        debug!("Failed to delete row {}: {}", id, e);
                        failed_ids.push(id.clone());
                    }
                }
            }

            if failed_ids.is_empty() {
                DeleteOutcome::Deleted(deleted)
            } else {
                DeleteOutcome::PartialFailure { deleted, failed_ids }
            }
        }
    }
}
