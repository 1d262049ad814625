//! Vector store implementations.
//!
//! [`InMemoryVectorStore`] is the reference implementation used by the CLI and
//! the test-suite. Production deployments inject their own
//! [`VectorStore`](crate::storage::VectorStore) client.

mod memory;

pub use memory::{InMemoryVectorStore, cosine_similarity, max_sim};
