/// Failures raised by [`crate::RemoteConnection`]. Connectivity problems are
/// expected operational events; callers catch them per target and keep going.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection to {address} has not been initialized")]
    NotInitialized { address: String },
    #[error("could not establish a tunnel to {address}, all {attempts} health checks failed")]
    HealthCheckFailed { address: String, attempts: u32 },
    #[error("connection to {address} was already used and cannot be started again")]
    NotRestartable { address: String },
    #[error("failed to launch tunnel to {address}: {detail}")]
    TunnelSpawn { address: String, detail: String },
    #[error("invalid remote address: {detail}")]
    InvalidAddress { detail: String },
}
