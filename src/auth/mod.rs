pub mod client;
pub mod providers;
pub mod session;
pub mod session_manager;
pub mod storage;
pub mod store;
pub mod user;

pub use client::{AuthClient, CurrentUserSource, CAN_REFRESH_KEY};
pub use providers::{create_provider, ProviderAdapter, ProviderConfig, ProviderMetadata};
pub use session::{AuthEvent, AuthState, Session, TokenResponse};
pub use session_manager::{AuthRedirect, IdentitySessionManager, OidcSessionManager};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::SessionStore;
pub use user::{AuthLevel, StandardizedUser};
