#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod assets;
pub mod config;
pub mod data;
pub mod format;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod schema;
