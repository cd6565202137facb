pub mod model;
pub mod normalizer;
pub mod ranker;
