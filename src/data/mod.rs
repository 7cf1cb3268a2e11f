//! Data domain: columnar samples and their on-disk streams.

pub mod domain;
pub mod repo_fs;

pub use domain::{Column, Record, Sample, SampleRepo};
