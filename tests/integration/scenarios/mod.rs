mod cli_probe_tests;
mod harness_tests;
mod session_probe_tests;
