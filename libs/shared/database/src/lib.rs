pub mod locks;
pub mod memory;
pub mod repository;
pub mod supabase;

pub use locks::{LockKey, RowGuard, RowLocks};
pub use memory::InMemoryRepository;
pub use repository::{Repository, RepositoryError};
pub use supabase::{SupabaseClient, SupabaseRepository};
