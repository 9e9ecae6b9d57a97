pub mod credentials;
pub mod oauth2;

pub use credentials::{CredentialPair, CredentialSource, EnvCredentials};
pub use oauth2::{EndpointSettings, TokenEndpointClient, TokenExchange};
