pub mod pipeline;
pub mod remover;
pub mod storage;
pub mod view;
pub mod worker;
