use portfox_core::{LifecycleError, ReleaseChannel};

mod product_details;
mod types;
mod urls;

pub use product_details::{map_request_error, ProductDetailsResolver};
pub use types::{ArtifactUrls, ReleaseDescriptor};
pub use urls::artifact_urls;

/// Looks up the newest published release of a channel. Implementations do not retry.
pub trait VersionResolver: Send + Sync {
    fn resolve(&self, channel: ReleaseChannel) -> Result<ReleaseDescriptor, LifecycleError>;
}

impl<T: VersionResolver + ?Sized> VersionResolver for Box<T> {
    fn resolve(&self, channel: ReleaseChannel) -> Result<ReleaseDescriptor, LifecycleError> {
        (**self).resolve(channel)
    }
}

#[cfg(test)]
mod tests;
