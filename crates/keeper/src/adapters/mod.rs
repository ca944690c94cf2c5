//! HTTP implementations of the gateway and social metrics capabilities

pub mod relayer;
pub mod social;

pub use relayer::RelayerGateway;
pub use social::HttpSocialSource;
