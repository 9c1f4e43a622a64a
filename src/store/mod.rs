//! Data store modules for Supabase integration

pub mod sessions;
pub mod supabase;

pub use sessions::{PlayerRow, SessionRow, SessionStore};
pub use supabase::{StoreError, SupabaseClient};
