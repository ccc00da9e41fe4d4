//! Reading locations for reflowable documents
//!
//! Reflowable content has no fixed pages. The engine addresses positions with
//! EPUB CFI strings, which this module parses into ordered [`LocationToken`]s:
//!
//! ```text
//! epubcfi(/6/4[chapter1]!/4/2/1:42)
//!         │  │          │ │ │ │ └── character offset 42
//!         │  │          │ │ │ └──── text node
//!         │  │          │ │ └────── element index
//!         │  │          │ └──────── element index (body)
//!         │  │          └────────── indirection (into content doc)
//!         │  └───────────────────── spine item with ID
//!         └──────────────────────── spine element
//! ```
//!
//! A layout pass produces a [`LocationIndex`], the ordered table that turns
//! tokens into 1-based positions and back.

mod comparator;
mod index;
mod parser;
mod types;

pub use index::LocationIndex;
pub use parser::{parse, LocationParseError};
pub use types::{LocationStep, LocationToken, StepKind};
