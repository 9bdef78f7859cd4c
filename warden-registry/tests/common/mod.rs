//! Backend-independent registry contract.
//!
//! Every backend test file invokes `registry_contract_tests!` with a factory
//! `async fn(&str) -> Option<Box<dyn NodeRegistry>>`. The factory receives the
//! case name (usable as a table suffix) and returns `None` when the backend
//! is not available in this environment. Backends that need external
//! services pass `ignore = "reason"` so their cases only run on request.

#![allow(dead_code)]

use std::time::Duration;
use warden_registry::NodeRegistration;

macro_rules! registry_contract_tests {
    (@all $make:path, $attrs:tt) => {
        registry_contract_tests!(@cases $make, $attrs =>
            register_returns_stored_record,
            register_is_idempotent_upsert,
            register_moves_node_between_licenses,
            deregister_removes_node,
            deregister_unknown_is_ok,
            count_scopes_by_license,
            list_orders_by_registration,
            list_unknown_license_is_empty,
            ping_updates_last_seen_only,
            ping_unknown_is_noop,
            prune_removes_only_stale_nodes,
            prune_with_wide_window_keeps_all,
            cancelled_context_interrupts_call,
        );
    };
    (@cases $make:path, $attrs:tt =>) => {};
    (@cases $make:path, $attrs:tt => $case:ident $(, $rest:ident)* $(,)?) => {
        registry_contract_tests!(@case $make, $attrs, $case);
        registry_contract_tests!(@cases $make, $attrs => $($rest),*);
    };
    (@case $make:path, [$(#[$meta:meta])*], $case:ident) => {
        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        $(#[$meta])*
        async fn $case() {
            let Some(registry) = $make(stringify!($case)).await else {
                return;
            };
            common::contract::$case(registry.as_ref()).await;
        }
    };
    ($make:path) => {
        registry_contract_tests!(@all $make, []);
    };
    ($make:path, ignore = $reason:literal) => {
        registry_contract_tests!(@all $make, [#[ignore = $reason]]);
    };
}

pub fn node(fingerprint: &str, license_key: &str) -> NodeRegistration {
    NodeRegistration {
        fingerprint: fingerprint.to_string(),
        hostname: format!("host-{fingerprint}"),
        ip: "10.0.0.1".to_string(),
        os: "linux".to_string(),
        license_key: license_key.to_string(),
    }
}

/// Long enough for two calls to land on distinct microsecond timestamps.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub mod contract {
    use super::{node, tick};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use warden_registry::NodeRegistry;
    use warden_types::{CallContext, Interrupted};

    pub async fn register_returns_stored_record(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        let input = node("fp-1", "KEY-A");

        let stored = registry.register(&ctx, &input).await.unwrap();

        assert_eq!(stored.fingerprint, "fp-1");
        assert_eq!(stored.hostname, "host-fp-1");
        assert_eq!(stored.ip, "10.0.0.1");
        assert_eq!(stored.os, "linux");
        assert_eq!(stored.license_key, "KEY-A");
        assert_eq!(stored.registered_at, stored.last_seen_at);
    }

    pub async fn register_is_idempotent_upsert(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        let first = registry.register(&ctx, &node("fp-1", "KEY-A")).await.unwrap();
        tick().await;

        let mut changed = node("fp-1", "KEY-A");
        changed.hostname = "renamed".to_string();
        changed.ip = "10.0.0.2".to_string();
        let second = registry.register(&ctx, &changed).await.unwrap();

        assert_eq!(second.registered_at, first.registered_at);
        assert!(second.last_seen_at > first.last_seen_at);
        assert_eq!(second.hostname, "renamed");
        assert_eq!(second.ip, "10.0.0.2");

        assert_eq!(registry.count(&ctx, "KEY-A").await.unwrap(), 1);
        let listed = registry.list(&ctx, "KEY-A").await.unwrap();
        assert_eq!(listed, vec![second]);
    }

    pub async fn register_moves_node_between_licenses(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.register(&ctx, &node("fp-1", "KEY-A")).await.unwrap();
        registry.register(&ctx, &node("fp-1", "KEY-B")).await.unwrap();

        assert_eq!(registry.count(&ctx, "KEY-A").await.unwrap(), 0);
        assert_eq!(registry.count(&ctx, "KEY-B").await.unwrap(), 1);
    }

    pub async fn deregister_removes_node(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.register(&ctx, &node("fp-1", "KEY-A")).await.unwrap();
        registry.register(&ctx, &node("fp-2", "KEY-A")).await.unwrap();

        registry.deregister(&ctx, "fp-1").await.unwrap();

        let listed = registry.list(&ctx, "KEY-A").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fingerprint, "fp-2");
    }

    pub async fn deregister_unknown_is_ok(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.deregister(&ctx, "never-registered").await.unwrap();
        registry.deregister(&ctx, "never-registered").await.unwrap();
    }

    pub async fn count_scopes_by_license(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        for fp in ["a", "b", "c"] {
            registry.register(&ctx, &node(fp, "KEY-A")).await.unwrap();
        }
        registry.register(&ctx, &node("d", "KEY-B")).await.unwrap();

        assert_eq!(registry.count(&ctx, "KEY-A").await.unwrap(), 3);
        assert_eq!(registry.count(&ctx, "KEY-B").await.unwrap(), 1);
        assert_eq!(registry.count(&ctx, "KEY-C").await.unwrap(), 0);
    }

    pub async fn list_orders_by_registration(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        for fp in ["zulu", "alpha", "mike"] {
            registry.register(&ctx, &node(fp, "KEY-A")).await.unwrap();
            tick().await;
        }
        // Re-registering keeps the original position.
        registry.register(&ctx, &node("zulu", "KEY-A")).await.unwrap();

        let order: Vec<String> = registry
            .list(&ctx, "KEY-A")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.fingerprint)
            .collect();
        assert_eq!(order, vec!["zulu", "alpha", "mike"]);
    }

    pub async fn list_unknown_license_is_empty(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.register(&ctx, &node("fp-1", "KEY-A")).await.unwrap();
        assert!(registry.list(&ctx, "KEY-Z").await.unwrap().is_empty());
    }

    pub async fn ping_updates_last_seen_only(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        let registered = registry.register(&ctx, &node("fp-1", "KEY-A")).await.unwrap();
        tick().await;

        registry.ping(&ctx, "fp-1").await.unwrap();

        let listed = registry.list(&ctx, "KEY-A").await.unwrap();
        assert_eq!(listed.len(), 1);
        let pinged = &listed[0];
        assert_eq!(pinged.registered_at, registered.registered_at);
        assert!(pinged.last_seen_at > registered.last_seen_at);
        assert_eq!(pinged.hostname, registered.hostname);
        assert_eq!(pinged.ip, registered.ip);
        assert_eq!(pinged.os, registered.os);
    }

    pub async fn ping_unknown_is_noop(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.ping(&ctx, "ghost").await.unwrap();
        assert_eq!(registry.count(&ctx, "KEY-A").await.unwrap(), 0);
    }

    pub async fn prune_removes_only_stale_nodes(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.register(&ctx, &node("stale", "KEY-A")).await.unwrap();
        registry.register(&ctx, &node("fresh", "KEY-A")).await.unwrap();
        registry.register(&ctx, &node("other", "KEY-B")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        registry.ping(&ctx, "fresh").await.unwrap();

        let removed = registry
            .prune(&ctx, "KEY-A", Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining: Vec<String> = registry
            .list(&ctx, "KEY-A")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.fingerprint)
            .collect();
        assert_eq!(remaining, vec!["fresh"]);
        // Other licenses are untouched even when stale.
        assert_eq!(registry.count(&ctx, "KEY-B").await.unwrap(), 1);
    }

    pub async fn prune_with_wide_window_keeps_all(registry: &dyn NodeRegistry) {
        let ctx = CallContext::background();
        registry.register(&ctx, &node("a", "KEY-A")).await.unwrap();
        registry.register(&ctx, &node("b", "KEY-A")).await.unwrap();

        let removed = registry
            .prune(&ctx, "KEY-A", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(registry.count(&ctx, "KEY-A").await.unwrap(), 2);
    }

    pub async fn cancelled_context_interrupts_call(registry: &dyn NodeRegistry) {
        let (ctx, handle) = CallContext::cancellable();
        handle.cancel();

        let err = registry.count(&ctx, "KEY-A").await.unwrap_err();
        assert_eq!(err.interrupted(), Some(Interrupted::Cancelled));
        assert!(err.to_string().contains("count nodes"));
    }
}
