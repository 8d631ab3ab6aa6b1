pub mod admin;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod model;
pub mod speakers;
pub mod telegram;
