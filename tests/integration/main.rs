//! Integration tests for poly-engine

mod support;

mod dispatcher_test;
mod engine_test;
mod execution_test;
mod risk_test;
mod store_test;
