pub mod review_states;
pub mod vocabulary;
