pub mod contract;
pub mod news;
pub mod recommendation;
