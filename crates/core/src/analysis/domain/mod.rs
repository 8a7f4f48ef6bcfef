pub mod ppg_analyzer;
pub mod score_fusion;
pub mod temporal_consistency;
pub mod verdict;
