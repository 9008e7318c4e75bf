//! Layer identifier generation.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle_encoding::hex;

/// Compute the SHA256 hash of the given string and return its lowercase
/// hexadecimal representation.
pub fn sha256<S: AsRef<str>>(s: S) -> String {
    let digest = Sha256::digest(s.as_ref());
    // Hex encoding only ever produces ASCII.
    String::from_utf8_lossy(&hex::encode(digest)).into_owned()
}

/// Produces the identifiers QGIS uses to reference layers within a project.
pub trait LayerIdGenerator {
    fn next_id(&mut self, layer_name: &str) -> String;
}

/// Random identifiers of the form `{name}_{uuid}`, fresh on every run.
#[derive(Debug, Default)]
pub struct RandomIds;

impl LayerIdGenerator for RandomIds {
    fn next_id(&mut self, layer_name: &str) -> String {
        format!("{}_{}", layer_name, uuid::Uuid::new_v4())
    }
}

/// Identifiers derived from the layer name and how often the name has been
/// seen, so that generating the same project twice yields identical output.
#[derive(Debug, Default)]
pub struct DeterministicIds {
    seen: HashMap<String, u32>,
}

impl LayerIdGenerator for DeterministicIds {
    fn next_id(&mut self, layer_name: &str) -> String {
        let occurrence = self.seen.entry(layer_name.to_string()).or_insert(0);
        let hash = sha256(format!("{}:{}", layer_name, occurrence));
        *occurrence += 1;
        format!("{}_{}", layer_name, &hash[..32])
    }
}
