//! Zone detection seam, used by the `auto` location constraint.

use async_trait::async_trait;
use rusty_gcsfs_common::GcsError;

/// Reports the compute zone the process runs in, e.g. `us-east1-b`.
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    async fn zone(&self) -> Result<String, GcsError>;
}

/// Fixed-zone provider, for tests and static deployments.
pub struct StaticZoneProvider {
    zone: String,
}

impl StaticZoneProvider {
    pub fn new(zone: impl Into<String>) -> Self {
        Self { zone: zone.into() }
    }
}

#[async_trait]
impl ZoneProvider for StaticZoneProvider {
    async fn zone(&self) -> Result<String, GcsError> {
        Ok(self.zone.clone())
    }
}

/// The region portion of a zone name: everything up to the last `-`.
///
/// `us-east1-b` → `us-east1`. A name without `-` is returned unchanged.
pub fn region_from_zone(zone: &str) -> &str {
    match zone.rfind('-') {
        Some(idx) => &zone[..idx],
        None => zone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_zone() {
        assert_eq!(region_from_zone("us-east1-b"), "us-east1");
        assert_eq!(region_from_zone("europe-west4-a"), "europe-west4");
        assert_eq!(region_from_zone("weird"), "weird");
    }
}
