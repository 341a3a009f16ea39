//! Process-lifetime file handles for record attachments.

pub mod registry;
