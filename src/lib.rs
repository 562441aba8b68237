pub mod api;
pub mod blocks;
pub mod config;
pub mod html;
pub mod markdown;
pub mod state;
pub mod terminal;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
