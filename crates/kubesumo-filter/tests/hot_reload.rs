use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use kubesumo_filter::{
    DropReason, ExclusionConfig, FilterConfig, PluginState, Record, SumoFilter, SumoMetadata,
    Verdict, WatchState,
};

fn record(namespace: &str, pod: &str) -> Record {
    let value = json!({
        "log": "request served",
        "stream": "stdout",
        "docker": {"container_id": "0f3c"},
        "kubernetes": {
            "namespace_name": namespace,
            "pod_name": pod,
            "container_name": "app",
            "host": "ip-10-0-0-1",
            "annotations": {"sumologic.com/sourceName": "%{namespace}-%{pod_name}"},
        }
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Replace the file atomically, the way ConfigMap volumes are updated
fn replace(path: &Path, contents: &str) {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).unwrap();
    fs::rename(&tmp, path).unwrap();
}

async fn wait_for_generation(filter: &SumoFilter, generation: u64) -> bool {
    for _ in 0..200 {
        if filter.rule_store().generation() >= generation {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_rules_follow_exclude_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exclude.yaml");
    fs::write(&path, "exclude_namespace_regex: ^kube-system$\n").unwrap();

    let config = FilterConfig {
        exclude_config_path: Some(path.clone()),
        exclude_config_poll_interval_ms: 10,
        exclude: ExclusionConfig {
            exclude_unit_regex: "docker".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut filter = SumoFilter::configure(config).unwrap();
    // loaded at configure time
    assert_eq!(filter.rule_store().generation(), 1);
    filter.start();
    assert_eq!(filter.state(), PluginState::Running);
    assert_eq!(filter.watch_state(), WatchState::Loaded);

    let mut system = record("kube-system", "coredns-5c98db65d4-4lhcv");
    assert_eq!(filter.filter(&mut system), Verdict::Drop(DropReason::Namespace));

    let mut app = record("payments", "checkout-6d9f8b7c5d-q2w3e");
    assert_eq!(filter.filter(&mut app), Verdict::Keep);
    let meta = SumoMetadata::from_record(&app).unwrap();
    assert_eq!(meta.source, "payments-checkout");
    assert_eq!(meta.category, "kubernetes/payments/checkout");

    replace(&path, "exclude_pod_regex: ^checkout-\nexclude_host_regex: \"\"\n");
    assert!(wait_for_generation(&filter, 2).await);

    let mut app = record("payments", "checkout-6d9f8b7c5d-q2w3e");
    assert_eq!(filter.filter(&mut app), Verdict::Drop(DropReason::Pod));
    // namespace rule is gone: absent keys clear their rule
    let mut system = record("kube-system", "coredns-5c98db65d4-4lhcv");
    assert_eq!(filter.filter(&mut system), Verdict::Keep);

    // journald rules survive reloads
    let mut journal: Record = serde_json::from_str(r#"{"_SYSTEMD_UNIT":"docker.service"}"#).unwrap();
    assert_eq!(filter.filter(&mut journal), Verdict::Drop(DropReason::Unit));

    // a broken file keeps the last good rules
    replace(&path, "exclude_pod_regex: \"(\"\n");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(filter.rule_store().generation(), 2);
    let mut app = record("payments", "checkout-6d9f8b7c5d-q2w3e");
    assert_eq!(filter.filter(&mut app), Verdict::Drop(DropReason::Pod));

    filter.shutdown().await;
    assert_eq!(filter.state(), PluginState::Stopped);
    assert_eq!(filter.watch_state(), WatchState::Stopped);

    // filtering still works after shutdown
    let mut app = record("payments", "checkout-6d9f8b7c5d-q2w3e");
    assert_eq!(filter.filter(&mut app), Verdict::Drop(DropReason::Pod));

    let stats = filter.stats();
    assert_eq!(stats.kept, 2);
    assert_eq!(stats.dropped_total(), 5);
}

#[tokio::test]
async fn test_edit_between_configure_and_start() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exclude.yaml");
    fs::write(&path, "exclude_namespace_regex: ^kube-system$\n").unwrap();

    let config = FilterConfig {
        exclude_config_path: Some(path.clone()),
        exclude_config_poll_interval_ms: 10,
        ..Default::default()
    };
    let mut filter = SumoFilter::configure(config).unwrap();
    assert_eq!(filter.rule_store().generation(), 1);
    assert_eq!(filter.watch_state(), WatchState::Unloaded);

    replace(&path, "exclude_namespace_regex: ^payments$\n");
    tokio::time::sleep(Duration::from_millis(50)).await;

    filter.start();
    assert!(wait_for_generation(&filter, 2).await);
    let mut app = record("payments", "checkout-6d9f8b7c5d-q2w3e");
    assert_eq!(filter.filter(&mut app), Verdict::Drop(DropReason::Namespace));

    filter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_filtering_during_reloads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exclude.yaml");
    fs::write(&path, "exclude_namespace_regex: ^ns-0$\nexclude_pod_regex: ^pod-0-\n").unwrap();

    let config = FilterConfig {
        exclude_config_path: Some(path.clone()),
        exclude_config_poll_interval_ms: 5,
        ..Default::default()
    };
    let mut filter = SumoFilter::configure(config).unwrap();
    filter.start();
    let filter = Arc::new(filter);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let filter = Arc::clone(&filter);
            tokio::task::spawn_blocking(move || {
                for _ in 0..5_000 {
                    // both patterns always name the same generation
                    let snapshot = filter.rule_store().snapshot();
                    let config = snapshot.rules.config();
                    let ns = config.exclude_namespace_regex.trim_start_matches("^ns-").trim_end_matches('$');
                    let pod = config.exclude_pod_regex.trim_start_matches("^pod-").trim_end_matches('-');
                    assert_eq!(ns, pod);

                    let mut rec = record("ns-x", "pod-x-1234567890-abcde");
                    assert_eq!(filter.filter(&mut rec), Verdict::Keep);
                }
            })
        })
        .collect();

    for i in 1..=10 {
        replace(
            &path,
            &format!("exclude_namespace_regex: ^ns-{i}$\nexclude_pod_regex: ^pod-{i}-\n# {}\n", "x".repeat(i)),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for worker in workers {
        worker.await.unwrap();
    }

    let mut filter = Arc::try_unwrap(filter).ok().unwrap();
    filter.shutdown().await;
    assert!(filter.rule_store().generation() >= 1);
}
