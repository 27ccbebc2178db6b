// src/lib.rs

//! Group Harvester Library

pub mod coordination;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod utils;
