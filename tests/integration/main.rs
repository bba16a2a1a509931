//! Integration test aggregator.

mod interactive_pipeline;
mod ordered_output;
mod search_end_to_end;
