//! Pure workspace state: file tree, transcript, payload decoding, selection.

pub mod file_tree;
pub mod payload;
pub mod selection;
pub mod transcript;
