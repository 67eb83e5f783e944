pub mod aws;

pub use aws::{ProviderKind, S3Provider};
