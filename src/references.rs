//! Revocable handles to in-memory artifacts.
//!
//! A reference lets presentation code display or save an artifact without holding its
//! bytes. Every reference handed out must eventually be revoked exactly once; the table
//! keeps counts so callers can check that nothing leaked or was released twice.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::ImageArtifact;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate the random part of a reference token.
fn gen_token() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    live: HashMap<ArtifactRef, Arc<ImageArtifact>>,
    seq: u64,
    created: u64,
    revoked: u64,
    double_revocations: u64,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh reference for `artifact`.
    pub fn create(&mut self, artifact: Arc<ImageArtifact>) -> ArtifactRef {
        self.seq += 1;
        let reference = ArtifactRef(format!("blob:squish/{}-{}", self.seq, gen_token()));
        debug!(
            reference = reference.as_str(),
            size_bytes = artifact.size_bytes(),
            "created artifact reference"
        );
        self.live.insert(reference.clone(), artifact);
        self.created += 1;
        reference
    }

    pub fn resolve(&self, reference: &ArtifactRef) -> Option<Arc<ImageArtifact>> {
        self.live.get(reference).cloned()
    }

    pub fn is_live(&self, reference: &ArtifactRef) -> bool {
        self.live.contains_key(reference)
    }

    /// Release a reference. Returns false (and counts it) if it was not live.
    pub fn revoke(&mut self, reference: &ArtifactRef) -> bool {
        if self.live.remove(reference).is_some() {
            self.revoked += 1;
            debug!(reference = reference.as_str(), "revoked artifact reference");
            true
        } else {
            self.double_revocations += 1;
            warn!(
                reference = reference.as_str(),
                "revoke of a reference that is not live"
            );
            false
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn created_count(&self) -> u64 {
        self.created
    }

    pub fn revoked_count(&self) -> u64 {
        self.revoked
    }

    pub fn double_revocations(&self) -> u64 {
        self.double_revocations
    }
}
