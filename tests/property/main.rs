//! Property test aggregator.

mod quoters;
mod writer_laws;
