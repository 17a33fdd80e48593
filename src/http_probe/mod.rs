pub mod probe;
pub mod proxy;
pub mod trace;

pub use probe::HttpProbe;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

/// Any byte stream a probe can speak HTTP over: plain TCP, a proxy tunnel or TLS.
pub(crate) trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Aborts the hyper connection task when the probe is done with it.
pub(crate) struct AbortOnDrop<T>(pub(crate) JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
