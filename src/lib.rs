//! rompatch - ROM hack patch manager
//!
//! Finds ROMs whose content matches a known hack or translation, then
//! applies the hack's patch chain with an external patcher.

pub mod archive;
pub mod cancel;
pub mod catalog;
pub mod hash;
pub mod matcher;
pub mod paths;
pub mod pipeline;
