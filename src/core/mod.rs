//! Core modules: the document model, the process layer, and the operations
//! built on them.

pub mod agents;
pub mod assessment;
pub mod config;
pub mod controls;
pub mod documents;
pub mod error;
pub mod evidence;
pub mod findings;
pub mod frontmatter;
pub mod process;
pub mod redact;
pub mod rpc;
pub mod store;
pub mod tabular;
pub mod time;
