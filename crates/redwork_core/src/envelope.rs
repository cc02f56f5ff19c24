//! Job Envelope Builder (C3) — spec §4.3.

use redwork_protocol::{Blob, DispatchError, Envelope};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

pub struct EnvelopeBuilder;

impl EnvelopeBuilder {
    /// Builds and size-checks an [`Envelope`], but does not store it — the
    /// caller (`dispatcher::submit`) writes it under `Q.env.J` once built,
    /// since only it knows the job id.
    ///
    /// `caller_scope` holds every binding resolvable in the caller's
    /// variable scope (spec's "caller's bindings `v`"); `auto_discovered`
    /// is the set of free symbols found by walking the expression (an
    /// external concern — parsing `expr` is opaque to this crate, so the
    /// caller supplies the already-discovered symbol set).
    pub fn build(
        expr: Blob,
        caller_scope: &HashMap<String, Blob>,
        auto_discovered: &HashSet<String>,
        noexport: &HashSet<String>,
        job_export: &[String],
        registry_export: &HashSet<String>,
        packages: Vec<String>,
        combine: Option<Blob>,
        envelope_cap_bytes: u64,
    ) -> Result<Envelope, DispatchError> {
        let mut bindings = BTreeMap::new();

        // Step 2: auto-discovery, minus noexport, resolved against caller scope.
        for name in auto_discovered {
            if noexport.contains(name) {
                continue;
            }
            if let Some(value) = caller_scope.get(name) {
                bindings.insert(name.clone(), value.clone());
            }
        }

        // Step 3: explicit export — per-job export ∪ process-wide export.
        let mut explicit: HashSet<&str> = job_export.iter().map(String::as_str).collect();
        explicit.extend(registry_export.iter().map(String::as_str));
        for name in explicit {
            if bindings.contains_key(name) {
                warn!(symbol = name, "export name overlaps with an auto-discovered binding");
            }
            match caller_scope.get(name) {
                Some(value) => {
                    bindings.insert(name.to_string(), value.clone());
                }
                None => return Err(DispatchError::ExportNotFound(name.to_string())),
            }
        }

        let envelope = Envelope { expr, bindings, packages, combine };

        // Step 4: size check.
        let encoded = serde_json::to_vec(&envelope)?;
        if encoded.len() as u64 > envelope_cap_bytes {
            return Err(DispatchError::EnvelopeTooLarge {
                size: encoded.len() as u64,
                cap: envelope_cap_bytes,
            });
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(s: &str) -> Blob {
        Blob::new(s.as_bytes().to_vec())
    }

    #[test]
    fn auto_discovery_resolves_against_caller_scope() {
        let mut scope = HashMap::new();
        scope.insert("x".to_string(), blob("1"));
        let auto: HashSet<String> = ["x".to_string()].into_iter().collect();
        let env = EnvelopeBuilder::build(
            blob("expr"), &scope, &auto, &HashSet::new(), &[], &HashSet::new(), vec![], None, 1024,
        )
        .unwrap();
        assert_eq!(env.bindings.get("x"), Some(&blob("1")));
    }

    #[test]
    fn noexport_suppresses_auto_discovered_symbol() {
        let mut scope = HashMap::new();
        scope.insert("x".to_string(), blob("1"));
        let auto: HashSet<String> = ["x".to_string()].into_iter().collect();
        let noexport: HashSet<String> = ["x".to_string()].into_iter().collect();
        let env = EnvelopeBuilder::build(
            blob("expr"), &scope, &auto, &noexport, &[], &HashSet::new(), vec![], None, 1024,
        )
        .unwrap();
        assert!(!env.bindings.contains_key("x"));
    }

    #[test]
    fn unresolved_explicit_export_fails() {
        let scope = HashMap::new();
        let err = EnvelopeBuilder::build(
            blob("expr"),
            &scope,
            &HashSet::new(),
            &HashSet::new(),
            &["g".to_string()],
            &HashSet::new(),
            vec![],
            None,
            1024,
        )
        .unwrap_err();
        match err {
            DispatchError::ExportNotFound(name) => assert_eq!(name, "g"),
            other => panic!("expected ExportNotFound, got {other:?}"),
        }
    }

    #[test]
    fn oversized_envelope_is_rejected() {
        let mut scope = HashMap::new();
        scope.insert("big".to_string(), Blob::new(vec![0u8; 1000]));
        let auto: HashSet<String> = ["big".to_string()].into_iter().collect();
        let err = EnvelopeBuilder::build(
            blob("expr"), &scope, &auto, &HashSet::new(), &[], &HashSet::new(), vec![], None, 100,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::EnvelopeTooLarge { .. }));
    }
}
