pub mod backend;
pub mod db;
pub mod pinecone;
pub mod pinecone_control;
pub mod surreal_index;
pub mod types;
pub mod vector_index;
