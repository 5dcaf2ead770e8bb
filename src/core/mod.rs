//! Storage, scheduling and export primitives behind the decorator

pub mod clock;
pub mod delay;
pub mod error;
pub mod format;
pub mod orchestrator;
pub mod preset;
pub mod reader;
pub mod storage;
pub mod worker;
pub mod writer;
