pub mod browse;
pub mod embedding;
pub mod index;
pub mod normalize;
pub mod planner;
pub mod recommendations;
pub mod search;
pub mod shaper;
pub mod trending;

pub use browse::BrowseService;
pub use embedding::{Embedder, HttpEmbedder};
pub use planner::QueryPlanner;
pub use recommendations::RecommendationEngine;
pub use search::SearchService;
pub use trending::TrendingAggregator;
