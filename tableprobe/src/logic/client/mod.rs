pub mod config;
pub mod rest;
pub mod url_utils;
