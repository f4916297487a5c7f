mod common;
mod job_store_tests;
