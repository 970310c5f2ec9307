//! Read DSSAT crop-model experiment archives into ordered data trees.
//!
//! The pieces, leaves first:
//! - [`format_specs`]: column schemas and the fixed-width line splitter,
//! - [`parsing`]: `yyddd` dates and missing-value sentinels,
//! - [`flags`]: the title/header/comment/data/blank line classifier,
//! - [`archive`]: opening ZIP archives or loose files and sorting them by kind,
//! - [`input`]: the [`DssatInput`](input::DssatInput) reader skeleton,
//! - [`tables`]: a ready-made reader driven by a book of schemas,
//! - [`holder`]: the tree readers return.
extern crate pest;
#[macro_use]
extern crate pest_derive;
pub mod dssat_error;
pub mod format_specs;
pub mod parsing;
pub mod flags;
pub mod holder;
pub mod archive;
pub mod input;
pub mod tables;
