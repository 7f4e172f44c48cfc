// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_repository;
pub mod gemini_coach;
pub mod http_response;
pub mod ndjson_stream;
