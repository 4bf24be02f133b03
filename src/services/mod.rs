pub mod converter;
pub mod lister;
pub mod pipeline;
pub mod scratch;
pub mod storage;
