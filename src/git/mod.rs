mod credentials;

pub mod fetcher;
pub mod repository;
