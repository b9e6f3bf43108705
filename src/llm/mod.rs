pub mod inference;
pub mod models;
pub mod tokenizer;
