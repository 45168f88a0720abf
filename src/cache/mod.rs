//! Cache roots, identity hashing, and the repository-cache collaborator.

pub mod dirs;
pub mod hasher;
pub mod repo;
