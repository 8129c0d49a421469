pub mod bootstrap;
pub use bootstrap::{BootstrapOutcome, ensure_default_admin};

pub mod password;
pub use password::{HashError, PasswordHasher};

pub mod token_service;
pub use token_service::{Claims, TokenError, TokenService};

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{LoginResult, NewAccount, UserError, UserService, UserUpdate};
pub use user_service_impl::DefaultUserService;
