//! Pipeline stages for image-to-PDF conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the PDF backend can be swapped without touching ingestion.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ coordinator ─┬─▶ fetch ──▶ normalize ─┬─▶ assemble ──▶ pdf
//! (dir scan)  (N workers) │  (URL→body) (decode)  │  (index order)  (lopdf)
//!                         └────── per item ───────┘
//! ```
//!
//! 1. [`input`]       — list supported files in a directory (CLI only)
//! 2. [`coordinator`] — bounded fan-out over a worker pool, index-ordered fan-in,
//!    cooperative cancellation
//! 3. [`fetch`]       — resolve URL-only sources into streaming bodies
//! 4. [`normalize`]   — probe or decode each image into a PDF-embeddable
//!    payload; CPU work runs in `spawn_blocking`
//! 5. [`assemble`]    — walk results in index order and add one page per image
//! 6. [`pdf`]         — the document builder the assembler writes through

pub mod assemble;
pub mod coordinator;
pub mod fetch;
pub mod input;
pub mod normalize;
pub mod pdf;
