// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use asinka::core::registry::{ObjectRegistry, RegistryChange};
use asinka::core::types::{SyncObject, Value};
use asinka::monitoring::Metrics;

#[derive(Clone, Debug)]
enum Op {
    Register { id: u8, version: u32 },
    Update { id: u8 },
    Delete { id: u8 },
    RemoteUpdate { id: u8, version: u32 },
    RemoteDelete { id: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 1u32..16).prop_map(|(id, version)| Op::Register { id, version }),
        (0u8..4).prop_map(|id| Op::Update { id }),
        (0u8..4).prop_map(|id| Op::Delete { id }),
        (0u8..4, 1u32..16).prop_map(|(id, version)| Op::RemoteUpdate { id, version }),
        (0u8..4).prop_map(|id| Op::RemoteDelete { id }),
    ]
}

fn object(id: u8, version: u32, origin: Option<&str>) -> SyncObject {
    let mut obj = SyncObject::new(format!("obj-{id}"), "Thing");
    obj.version = version;
    obj.origin_session = origin.map(str::to_string);
    obj
}

/// Shadow model: the registry state any sequence of calls must produce.
fn apply_model(model: &mut HashMap<String, u32>, op: &Op) {
    match op {
        Op::Register { id, version } => {
            model.insert(format!("obj-{id}"), *version);
        }
        Op::Update { id } => {
            if let Some(v) = model.get_mut(&format!("obj-{id}")) {
                *v += 1;
            }
        }
        Op::Delete { id } | Op::RemoteDelete { id } => {
            model.remove(&format!("obj-{id}"));
        }
        Op::RemoteUpdate { id, version } => {
            let key = format!("obj-{id}");
            match model.get(&key) {
                Some(local) if *local >= *version => {}
                _ => {
                    model.insert(key, *version);
                }
            }
        }
    }
}

fn apply_registry(registry: &ObjectRegistry, op: &Op) {
    match op {
        Op::Register { id, version } => registry.register(object(*id, *version, None)),
        Op::Update { id } => {
            let mut fields = BTreeMap::new();
            fields.insert("touched".to_string(), Value::Bool(true));
            registry.update(&format!("obj-{id}"), fields);
        }
        Op::Delete { id } => registry.delete(&format!("obj-{id}")),
        Op::RemoteUpdate { id, version } => {
            registry.apply_remote_update(object(*id, *version, Some("s-remote")));
        }
        Op::RemoteDelete { id } => registry.apply_remote_delete(&format!("obj-{id}"), "Thing"),
    }
}

proptest! {
    /// After every call, `get` reflects the most recent accepted mutation
    /// per id, with remote values filtered through the version gate.
    #[test]
    fn get_always_reflects_the_latest_accepted_call(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let registry = ObjectRegistry::new(Arc::new(Metrics::new().unwrap()));
        let mut model: HashMap<String, u32> = HashMap::new();

        for op in &ops {
            apply_registry(&registry, op);
            apply_model(&mut model, op);

            for id in 0u8..4 {
                let key = format!("obj-{id}");
                let stored = registry.get(&key).map(|o| o.version);
                prop_assert_eq!(stored, model.get(&key).copied());
            }
        }
    }

    /// The version gate: post-state equals the incoming update iff its
    /// version is strictly greater than the stored one.
    #[test]
    fn version_gate_is_strictly_greater(pre in 1u32..32, incoming in 1u32..32) {
        let registry = ObjectRegistry::new(Arc::new(Metrics::new().unwrap()));
        registry.register(object(0, pre, None));
        registry.apply_remote_update(object(0, incoming, Some("s-1")));

        let stored = registry.get("obj-0").unwrap();
        if incoming > pre {
            prop_assert_eq!(stored.version, incoming);
            prop_assert_eq!(stored.origin_session.as_deref(), Some("s-1"));
        } else {
            prop_assert_eq!(stored.version, pre);
            prop_assert_eq!(stored.origin_session, None);
        }
    }
}

/// The per-id stream is a subsequence of the global stream filtered to
/// that id, in the same relative order.
#[tokio::test]
async fn per_id_stream_is_a_filtered_subsequence_of_the_global_stream() {
    let registry = ObjectRegistry::new(Arc::new(Metrics::new().unwrap()));
    let mut all = registry.observe_all();
    let mut one = registry.observe("obj-1");

    // Interleave traffic on two ids.
    for round in 1u32..=5 {
        registry.register(object(1, round * 2 - 1, None));
        registry.register(object(2, round, None));
        let mut fields = BTreeMap::new();
        fields.insert("round".to_string(), Value::I64(i64::from(round)));
        registry.update("obj-1", fields);
    }
    drop(registry);

    let mut global_versions = Vec::new();
    while let Some(change) = all.recv().await {
        if let RegistryChange::Updated(obj) = change {
            if obj.object_id == "obj-1" {
                global_versions.push(obj.version);
            }
        }
    }
    let mut per_id_versions = Vec::new();
    while let Some(obj) = one.recv().await {
        per_id_versions.push(obj.version);
    }

    assert!(!per_id_versions.is_empty());
    // Same relative order; the per-id stream may only be missing entries.
    let mut global_iter = global_versions.iter();
    for v in &per_id_versions {
        assert!(
            global_iter.any(|g| g == v),
            "per-id emission {v} missing from global order {global_versions:?}"
        );
    }
}
