pub mod assembler;
pub mod diversity;
pub mod exploration;
pub mod feed;
pub mod preferences;
pub mod ranking;
pub mod recall;

pub use assembler::FeedAssembler;
pub use diversity::DiversityLayer;
pub use exploration::ExplorationSelector;
pub use feed::FeedEngine;
pub use preferences::{PreferenceCache, PreferenceLoader};
pub use ranking::RankingLayer;
pub use recall::{RecallLayer, RecallRequest, RecallStrategy};
