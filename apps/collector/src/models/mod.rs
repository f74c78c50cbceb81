pub mod repo;
pub mod rows;
