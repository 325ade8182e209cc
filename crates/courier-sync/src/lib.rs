pub mod destination;
pub mod discovery;
pub mod driver;
mod keys;
pub mod peer;
pub mod scratch;
pub mod source;
pub mod transfer;

pub use destination::{Destination, PushTarget};
pub use discovery::{Discovery, HttpDiscovery};
pub use driver::Reconciler;
pub use peer::PeerClient;
pub use transfer::{PushResult, RsyncPlan, RsyncTransfer, Transfer};
