pub mod aggregator;
pub mod consistency;
pub mod keywords;
pub mod predictor;
pub mod procedural;
pub mod scorer;
