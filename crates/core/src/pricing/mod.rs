pub mod matching;
pub mod resolver;
pub mod sources;
