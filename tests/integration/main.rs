//! Integration tests for perp-momentum

mod ladder_test;
mod scenario_test;
mod store_test;
mod support;
