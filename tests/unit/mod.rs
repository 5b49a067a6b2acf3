mod basic_tests;
mod stats_tests;
