// Test modules for natcheck
// Shared doubles live in `support`

mod support;

mod config_tests;
mod host_tests;
mod protocol_tests;
mod report_tests;
