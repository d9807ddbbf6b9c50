pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use db::{FeedStore, PgFeedStore};
pub use error::{AppError, Result};
pub use models::{FeedRequest, FeedResponse, GeoPoint, PostRecommendation};
pub use services::{DiversityLayer, FeedEngine, RankingLayer, RecallLayer};
