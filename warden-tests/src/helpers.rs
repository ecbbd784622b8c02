pub mod proxy_harness;
pub mod wait_utils;
