//! Component configuration sections

pub mod embedding;
