pub mod classify;
pub mod config;
pub mod dataservice;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod importer;
pub mod lambda;
pub mod notify;
pub mod output;
pub mod s3;
