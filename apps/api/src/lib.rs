pub mod browser;
pub mod config;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod llm_client;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod routes;
pub mod search;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
