//! PDF retouch: replace images in a PDF and read selected text aloud.
//!
//! # Layout
//!
//! ```text
//! session ──┬─▶ document   (DocumentEngine, LopdfEngine)
//!           ├─▶ ledger     (EditLedger, SaveJob)
//!           ├─▶ selection  (hit testing)
//!           ├─▶ preview    (PageView composition)
//!           └─▶ speech     (SpeechService ─▶ worker thread)
//! config ─────▶ settings.toml
//! shell ──────▶ line commands for the headless front end
//! ```

pub mod config;
pub mod document;
pub mod geometry;
pub mod ledger;
pub mod preview;
pub mod selection;
pub mod session;
pub mod shell;
pub mod speech;
