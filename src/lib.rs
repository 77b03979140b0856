pub mod api;
pub mod config;
pub mod logging;
pub mod media;
pub mod state;
#[cfg(test)]
pub mod test_support;
pub mod types;
pub mod util;
