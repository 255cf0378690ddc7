//! Infrastructure layer: HTTP, parsing, storage and file outputs.

pub mod config;
pub mod database_connection;
pub mod export;
pub mod file_store;
pub mod hotel_page;
pub mod http_client;
pub mod logging;
pub mod photo_downloader;
pub mod response_parser;
pub mod review_api;
pub mod review_repository;
