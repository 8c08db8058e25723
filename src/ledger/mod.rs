//! Edit ledger: pending image replacements and save-commit.
//!
//! # Architecture
//!
//! ```text
//! replace action ──▶ EditLedger::add_or_replace(page, rect, image)
//!                      │   unique per (page, rect), ledger order kept
//!                      │
//!                      ├──▶ records_for_page ──▶ preview overlays
//!                      │
//! save action ───────▶ SaveJob { source, destination, snapshot, policy }
//!                      │   preflight ─▶ open copy ─▶ paint + insert ─▶ save
//!                      ▼
//!              Ok(SaveReport)  ─▶ session adopts destination, ledger cleared
//!              Err(SaveError)  ─▶ ledger and live document unchanged
//! ```

pub mod commit;
pub mod edits;
pub mod record;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use commit::{ImageFailure, SaveError, SaveJob, SaveReport, SkipReason, SkippedRecord};
pub use edits::{EditLedger, LedgerError, Upsert};
pub use record::ImageModification;
