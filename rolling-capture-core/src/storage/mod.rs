pub mod metadata;
pub mod output;
pub mod scratch;
