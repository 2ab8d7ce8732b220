pub mod cache;
pub mod cascade;
pub mod config;
pub mod error;
pub mod events;
pub mod photo;
pub mod processing;
pub mod sources;
pub mod tasks {
    pub mod loader;
    pub mod slideshow;
}
