//! Catalog mutation and snapshot/restore: the component that edits
//! `gp_segment_configuration` to add new segment rows, and that owns
//! the single catalog snapshot consulted when rollback has to undo a
//! `CATALOG_DONE` phase.

pub mod mutator;

pub use mutator::CatalogMutator;
