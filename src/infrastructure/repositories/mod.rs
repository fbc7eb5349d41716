pub mod memory;
pub mod mongo;

pub use memory::{InMemoryJobInstanceRepository, InMemoryJobRepository, InMemoryMeasureProvider};
pub use mongo::{MongoJobInstanceRepository, MongoJobRepository};
