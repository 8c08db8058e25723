//! Document engine module.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               DocumentEngine (trait)                    │
//! │                                                         │
//! │   open ──▶ DocumentHandle ──┬─▶ page_count / render     │
//! │                             ├─▶ image_regions           │
//! │                             ├─▶ extract_text(clip)      │
//! │                             ├─▶ paint_rect + insert_image│
//! │                             └─▶ save (atomic) / close   │
//! │                                                         │
//! │   ┌─────────────┐        ┌──────────────────┐          │
//! │   │ LopdfEngine │        │ ImageRef          │          │
//! │   │ (lopdf)     │◀───────│ Path | Bytes      │          │
//! │   └─────────────┘  load  └──────────────────┘          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use pdf_retouch::document::{DocumentEngine, LopdfEngine};
//!
//! let mut engine = LopdfEngine::new();
//! let doc = engine.open("report.pdf".as_ref()).expect("open");
//! for region in engine.image_regions(doc, 0).expect("page 0") {
//!     println!("image at {}", region.bbox);
//! }
//! ```

pub mod engine;
pub mod image_ref;
pub mod lopdf_engine;
#[cfg(test)]
pub mod mock;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{DocumentEngine, DocumentError, DocumentHandle, FillColor, ImageRegion};
pub use image_ref::{ImageRef, ReplacementImageError};
pub use lopdf_engine::LopdfEngine;

// test-only re-export so session and ledger tests can import the mock
// without reaching into the submodule.
#[cfg(test)]
pub use mock::{MockDocumentEngine, MockOp, MockPage};
