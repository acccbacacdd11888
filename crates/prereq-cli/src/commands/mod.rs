pub mod annotate;
pub mod generate;
pub mod init;
pub mod list_models;
pub mod merge;
pub mod status;
