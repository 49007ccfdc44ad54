//! Core library for the scorpion command line application.
//!
//! A pipeline is declared in one JSON or YAML document. Sources are resolved
//! from layered configuration in [`scorpion::etl::source`] and loaded by
//! [`scorpion::etl::loader`], named tables live in the
//! [`scorpion::etl::registry`], declared steps are run by the
//! [`scorpion::etl::manager`] against transformers from
//! [`scorpion::etl::transformer`], and results are written by
//! [`scorpion::etl::output`]. [`scorpion::etl::pipeline`] ties the stages
//! together.

pub mod scorpion;

pub use scorpion::etl::{
    EtlError, Result, builtin, config, error, instruction, io, loader, manager, model, output,
    pipeline, registry, source, transformer,
};
