//! Node configuration, exposed as command line arguments.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod args;
