pub mod resolver;
pub mod sync;
pub mod vcs;
