pub mod models;
pub mod normalization;
pub mod scoring;
