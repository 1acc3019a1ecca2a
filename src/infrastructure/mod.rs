pub mod remover;
pub mod storage;
