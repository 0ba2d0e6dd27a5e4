//! Auth session management: PKCE handshake, token persistence, and the
//! self-renewing refresh scheduler.

mod pkce;
mod session;
mod token_client;

pub use pkce::{code_challenge, generate_state, generate_verifier};
pub use session::{AuthPhase, AuthSession, AuthorizeRequest, TokenSource};
pub use token_client::{HttpTokenClient, TokenApi, TokenResponse};
