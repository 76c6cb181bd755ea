pub mod file_exporter;
pub mod http_client;
