pub mod compaction;
pub mod duration;
pub mod finalizer;
pub mod ledger;
pub mod rotation;
pub mod segment;
