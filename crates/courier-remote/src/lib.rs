pub mod connection;
pub mod error;
mod tunnel;

pub use connection::{
    connect_http, connect_ssh, ConnectionSpec, HealthTarget, RemoteConnection, SshLogin,
    SshTunnelSpec,
};
pub use error::ConnectError;
