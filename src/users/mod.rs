mod memory;
mod repo;
mod repo_types;

pub use memory::MemoryUserStore;
pub use repo::{PgUserStore, SweepStats, UserStore};
pub use repo_types::{NewUser, OtpChallenge, PublicUser, Session, User, UserPatch, UserType};
