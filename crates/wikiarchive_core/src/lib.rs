pub mod config;
pub mod credentials;
pub mod error;
pub mod filename;
pub mod mediawiki;
pub mod pages;
pub mod progress;
pub mod publish;
pub mod runtime;
pub mod table;
pub mod templates;
pub mod upload;

#[cfg(test)]
mod testing;
