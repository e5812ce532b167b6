//! # Integration Tests
//!
//! Integration tests and end-to-end tests.
//!
//! Responsibilities:
//! - End-to-end pipeline scenarios (mapping, remote enrichment, fanout)
//! - Pacing and termination behavior of the chunked pull engine
//! - Worker lifecycle scenarios (idle TTL, crash recovery, singleton)

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use cluster::{Cluster, ClusterBuilder};
    use contracts::{Element, RuleOutcome};
    use rules::Rule;
    use serde_json::Value;

    /// Sort completed elements into a stable order for comparison.
    pub fn sorted(mut elems: Vec<Element>) -> Vec<Element> {
        elems.sort_by_key(|e| {
            (
                e.tag.clone(),
                e.get_str("provider").unwrap_or_default().to_string(),
                e.get("seq").and_then(Value::as_u64).unwrap_or(0),
            )
        });
        elems
    }

    pub fn seq_of(elem: &Element) -> u64 {
        elem.get("seq").and_then(Value::as_u64).unwrap_or(0)
    }

    pub async fn single_node_cluster() -> (Cluster, contracts::NodeCtx) {
        let cluster = ClusterBuilder::new().node("solo").build();
        let node = cluster.node("solo").unwrap();
        (cluster, node)
    }

    /// The mapping rule set: suffix the provider, classify its first
    /// letter, stamp two constant fields.
    pub fn product_rules() -> Vec<Rule> {
        let mut rules = vec![
            Rule::local(
                "append_suffix",
                |elem, _state| {
                    elem.get_str("provider")
                        .is_some_and(|p| !p.ends_with("XXX"))
                },
                |mut elem, _state| {
                    let provider = elem.get_str("provider").unwrap_or_default().to_string();
                    elem.set("provider", format!("{provider}XXX"));
                    Ok(RuleOutcome::Replace(elem))
                },
            ),
            starts_with_rule("a"),
            starts_with_rule("b"),
        ];
        rules.push(constant_field_rule("add_f1", "f1", "v1"));
        rules.push(constant_field_rule("add_f2", "f2", "v2"));
        rules
    }

    fn starts_with_rule(letter: &'static str) -> Rule {
        Rule::local(
            format!("starts_with_{letter}"),
            move |elem, _state| {
                !elem.has("starts_with")
                    && elem
                        .get_str("provider")
                        .is_some_and(|p| p.ends_with("XXX") && p.starts_with(letter))
            },
            move |mut elem, _state| {
                elem.set("starts_with", letter);
                Ok(RuleOutcome::Replace(elem))
            },
        )
    }

    fn constant_field_rule(name: &'static str, field: &'static str, value: &'static str) -> Rule {
        Rule::local(
            name,
            move |elem, _state| !elem.has(field),
            move |mut elem, _state| {
                elem.set(field, value);
                Ok(RuleOutcome::Replace(elem))
            },
        )
    }

    /// Register the lookup unit kind and its fetch handlers used by the
    /// remote-enrichment tests. Workers hold their argument as the data.
    pub fn with_lookup_units(builder: ClusterBuilder, home: &'static str) -> ClusterBuilder {
        builder
            .register_unit_kind(Arc::new(unit_router::SimpleUnit::new(
                "source1",
                move |_arg| home.into(),
                |arg| Ok(Box::new(arg.to_string()) as contracts::UnitState),
            )))
            .register_handler(
                "fetch_into_source_data",
                Arc::new(|worker_state, elem, _rule_state| {
                    let held = worker_state
                        .downcast_ref::<String>()
                        .expect("lookup worker holds a string")
                        .clone();
                    let mut elem = elem.clone();
                    elem.set("source_data", held);
                    Ok(RuleOutcome::Replace(elem))
                }),
            )
            .register_handler(
                "extend_source_data",
                Arc::new(|worker_state, elem, _rule_state| {
                    let held = worker_state
                        .downcast_ref::<String>()
                        .expect("lookup worker holds a string")
                        .clone();
                    let existing = elem
                        .get_str("source_data")
                        .expect("first fetch ran")
                        .to_string();
                    let mut elem = elem.clone();
                    elem.set("source_data", serde_json::json!([existing, held]));
                    Ok(RuleOutcome::Replace(elem))
                }),
            )
    }
}

/// End-to-end mapping: ordered local rules with scan-restart semantics.
#[cfg(test)]
mod mapping_tests {
    use std::time::Duration;

    use contracts::Element;
    use rules::{PipelineDef, PipelineEmit, RuleGroup};
    use stream::{ElementStream, StreamOptions};

    use crate::support::{product_rules, single_node_cluster, sorted};

    #[tokio::test]
    async fn test_basic_mapping() {
        let (cluster, node) = single_node_cluster().await;
        let def = PipelineDef::define(
            "mapping",
            vec![RuleGroup::new("product", product_rules())],
        );
        cluster.registries().register_pipeline(def.clone());

        let source = vec![
            Element::new("product").with_field("provider", "casto"),
            Element::new("product").with_field("provider", "berenice"),
        ];
        let stream = ElementStream::start(
            node,
            source.into_iter(),
            PipelineEmit::new(&def),
            StreamOptions {
                chunk_size: 10,
                done_timeout: Duration::from_millis(100),
            },
        );

        let out = sorted(stream.collect_all().await);
        assert_eq!(out.len(), 2);

        // berenice: suffixed first, then classified by the restarted scan.
        assert_eq!(out[0].get_str("provider"), Some("bereniceXXX"));
        assert_eq!(out[0].get_str("starts_with"), Some("b"));
        assert_eq!(out[0].get_str("f1"), Some("v1"));
        assert_eq!(out[0].get_str("f2"), Some("v2"));

        // casto: suffixed, no first-letter class applies.
        assert_eq!(out[1].get_str("provider"), Some("castoXXX"));
        assert!(!out[1].has("starts_with"));
        assert_eq!(out[1].get_str("f1"), Some("v1"));
        assert_eq!(out[1].get_str("f2"), Some("v2"));

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_unmatched_tag_passes_through_untouched() {
        let (cluster, node) = single_node_cluster().await;
        let def = PipelineDef::define(
            "mapping",
            vec![RuleGroup::new("product", product_rules())],
        );
        cluster.registries().register_pipeline(def.clone());

        let source = vec![Element::new("telemetry").with_field("provider", "casto")];
        let stream = ElementStream::start(
            node,
            source.into_iter(),
            PipelineEmit::new(&def),
            StreamOptions {
                chunk_size: 4,
                done_timeout: Duration::from_millis(50),
            },
        );

        let out = stream.collect_all().await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_str("provider"), Some("casto"), "no rule fired");

        cluster.shutdown().await;
    }
}

/// End-to-end remote enrichment: the element hops to the data's node and
/// the walk resumes there.
#[cfg(test)]
mod remote_tests {
    use std::time::Duration;

    use cluster::ClusterBuilder;
    use contracts::{Element, UnitSpec};
    use rules::{PipelineDef, PipelineEmit, Rule, RuleGroup};
    use serde_json::json;
    use stream::{ElementStream, StreamOptions};

    use crate::support::{product_rules, with_lookup_units};

    fn enrichment_rules() -> Vec<Rule> {
        let mut rules = product_rules();
        rules.push(Rule::remote(
            "fetch_first",
            |elem, _state| {
                elem.get("with_remote").and_then(|v| v.as_bool()) == Some(true)
                    && !elem.has("source_data")
            },
            |_elem, _state| UnitSpec::new("source1", "d1"),
            "fetch_into_source_data",
        ));
        rules.push(Rule::remote(
            "fetch_second",
            |elem, _state| elem.get("source_data").is_some_and(|v| v.is_string()),
            |_elem, _state| UnitSpec::new("source1", "d2"),
            "extend_source_data",
        ));
        rules
    }

    #[tokio::test]
    async fn test_remote_enrichment() {
        let builder = ClusterBuilder::new().node("origin").node("store");
        let cluster = with_lookup_units(builder, "store").build();

        let def = PipelineDef::define(
            "enrichment",
            vec![RuleGroup::new("product", enrichment_rules())],
        );
        cluster.registries().register_pipeline(def.clone());

        let source = vec![Element::new("product")
            .with_field("provider", "casto")
            .with_field("with_remote", true)];
        let stream = ElementStream::start(
            cluster.node("origin").unwrap(),
            source.into_iter(),
            PipelineEmit::new(&def),
            StreamOptions {
                chunk_size: 4,
                done_timeout: Duration::from_millis(200),
            },
        );

        let out = stream.collect_all().await;
        assert_eq!(out.len(), 1);
        let elem = &out[0];
        assert_eq!(elem.get_str("provider"), Some("castoXXX"));
        assert_eq!(elem.get_str("f1"), Some("v1"));
        assert_eq!(elem.get_str("f2"), Some("v2"));
        assert_eq!(elem.get("source_data"), Some(&json!(["d1", "d2"])));
        assert_eq!(elem.get("with_remote"), Some(&json!(true)));

        // Both workers were placed on the store node.
        let store_metrics = cluster.router_metrics("store").unwrap();
        assert_eq!(store_metrics.workers_started, 2);
        assert_eq!(cluster.router_metrics("origin").unwrap().workers_started, 0);

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_elements_without_the_flag_skip_the_remote_rules() {
        let builder = ClusterBuilder::new().node("origin").node("store");
        let cluster = with_lookup_units(builder, "store").build();

        let def = PipelineDef::define(
            "enrichment",
            vec![RuleGroup::new("product", enrichment_rules())],
        );
        cluster.registries().register_pipeline(def.clone());

        let source = vec![Element::new("product").with_field("provider", "casto")];
        let stream = ElementStream::start(
            cluster.node("origin").unwrap(),
            source.into_iter(),
            PipelineEmit::new(&def),
            StreamOptions {
                chunk_size: 4,
                done_timeout: Duration::from_millis(100),
            },
        );

        let out = stream.collect_all().await;
        assert_eq!(out.len(), 1);
        assert!(!out[0].has("source_data"));
        assert_eq!(cluster.router_metrics("store").unwrap().workers_started, 0);

        cluster.shutdown().await;
    }
}

/// Mid-stream fanout: emit routines inject new elements while the stream
/// is being drained.
#[cfg(test)]
mod fanout_tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use contracts::{Element, EmitFn, EmitScope, PipelineError};
    use rand::Rng;
    use serde_json::Value;
    use stream::{ElementStream, StreamOptions};
    use tokio::time::{sleep, timeout};

    use crate::support::{seq_of, single_node_cluster};

    /// t1 elements each spawn a t2 twin in random order around their own
    /// completion; the t2 with seq 1000 fans out a tail of 500 more.
    struct FanoutEmit;

    #[async_trait]
    impl EmitFn for FanoutEmit {
        async fn emit(&self, scope: &EmitScope, element: Element) -> Result<(), PipelineError> {
            let seq = element.get("seq").and_then(Value::as_u64).unwrap_or(0);
            match element.tag.as_str() {
                "t1" => {
                    let twin = Element::new("t2").with_field("seq", seq);
                    let emit_first = { rand::rng().random_range(0..2) == 0 };
                    if emit_first {
                        scope.emit(vec![twin]);
                        scope.done(element);
                    } else {
                        scope.done(element);
                        scope.emit(vec![twin]);
                    }
                }
                "t2" if seq == 1000 => {
                    scope.emit(
                        (1001..=1500u64)
                            .map(|i| Element::new("t2").with_field("seq", i))
                            .collect(),
                    );
                    scope.done(element);
                }
                _ => {
                    let ms = { rand::rng().random_range(0..200u64) };
                    sleep(Duration::from_millis(ms)).await;
                    scope.done(element);
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mid_stream_fanout() {
        let (cluster, node) = single_node_cluster().await;

        let source = (0..=1000u64).map(|i| Element::new("t1").with_field("seq", i));
        let stream = ElementStream::start(
            node,
            source,
            std::sync::Arc::new(FanoutEmit),
            StreamOptions::default(),
        );

        let out = timeout(Duration::from_secs(60), stream.collect_all())
            .await
            .expect("fanout stream did not terminate");
        assert_eq!(out.len(), 2502);

        let mut t1: Vec<u64> = out.iter().filter(|e| e.tag == "t1").map(seq_of).collect();
        let mut t2: Vec<u64> = out.iter().filter(|e| e.tag == "t2").map(seq_of).collect();
        t1.sort_unstable();
        t2.sort_unstable();
        assert_eq!(t1, (0..=1000).collect::<Vec<u64>>());
        assert_eq!(t2, (0..=1500).collect::<Vec<u64>>());

        cluster.shutdown().await;
    }
}

/// Chunk pacing: demand-driven launching bounds in-flight work.
#[cfg(test)]
mod pacing_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use contracts::{Element, EmitFn, EmitScope, PipelineError};
    use stream::{ElementStream, StreamOptions};
    use tokio::time::sleep;

    use crate::support::single_node_cluster;

    struct SlowDone(Duration);

    #[async_trait]
    impl EmitFn for SlowDone {
        async fn emit(&self, scope: &EmitScope, element: Element) -> Result<(), PipelineError> {
            sleep(self.0).await;
            scope.done(element);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chunk_bound_and_pacing() {
        let (cluster, node) = single_node_cluster().await;
        let source = (0..20u64).map(|i| Element::new("t").with_field("seq", i));
        let mut stream = ElementStream::start(
            node,
            source,
            Arc::new(SlowDone(Duration::from_millis(50))),
            StreamOptions {
                chunk_size: 4,
                done_timeout: Duration::from_millis(200),
            },
        );

        let started = Instant::now();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            chunks.push(chunk.len());
        }
        let elapsed = started.elapsed();

        // Every chunk is exactly the configured size (20 divides evenly).
        assert_eq!(chunks, vec![4, 4, 4, 4, 4]);
        // Each pull waits for its own launches: at least 5 * 50ms overall.
        assert!(
            elapsed >= Duration::from_millis(250),
            "stream finished too fast: {elapsed:?}"
        );

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_termination_is_prompt_after_the_last_completion() {
        let (cluster, node) = single_node_cluster().await;
        let source = (0..4u64).map(|i| Element::new("t").with_field("seq", i));
        let mut stream = ElementStream::start(
            node,
            source,
            Arc::new(SlowDone(Duration::from_millis(10))),
            StreamOptions {
                chunk_size: 4,
                done_timeout: Duration::from_millis(100),
            },
        );

        assert_eq!(stream.next_chunk().await.unwrap().len(), 4);

        let started = Instant::now();
        assert!(stream.next_chunk().await.is_none());
        let halt_latency = started.elapsed();
        assert!(
            halt_latency < Duration::from_secs(2),
            "halt took {halt_latency:?}"
        );

        cluster.shutdown().await;
    }
}

/// Worker lifecycle: idle TTL, crash recovery, cluster-wide singleton.
#[cfg(test)]
mod worker_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cluster::ClusterBuilder;
    use contracts::{UnitSpec, UnitState};
    use tokio::sync::oneshot;
    use tokio::time::sleep;
    use unit_router::SimpleUnit;

    fn counting_kind(name: &'static str, starts: Arc<AtomicUsize>, ttl: Duration) -> SimpleUnit {
        SimpleUnit::new(
            name,
            |_arg| "solo".into(),
            move |_arg| {
                starts.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(0u32) as UnitState)
            },
        )
        .with_ttl(ttl)
    }

    #[tokio::test]
    async fn test_idle_ttl_expiry_and_lazy_restart() {
        let starts = Arc::new(AtomicUsize::new(0));
        let cluster = ClusterBuilder::new()
            .node("solo")
            .register_unit_kind(Arc::new(counting_kind(
                "expiring",
                Arc::clone(&starts),
                Duration::from_millis(100),
            )))
            .build();
        let node = cluster.node("solo").unwrap();
        let spec = UnitSpec::new("expiring", "x");

        let (tx, rx) = oneshot::channel();
        node.cast(
            spec.clone(),
            Box::new(move |_state| {
                let _ = tx.send(());
            }),
        )
        .await
        .unwrap();
        rx.await.unwrap();

        // Let the idle timer expire, then cast again.
        sleep(Duration::from_millis(300)).await;

        let (tx, rx) = oneshot::channel();
        node.cast(
            spec,
            Box::new(move |_state| {
                let _ = tx.send(());
            }),
        )
        .await
        .unwrap();
        rx.await.unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 2, "exactly two start events");

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_crash_on_second_delivery_recovers() {
        let starts = Arc::new(AtomicUsize::new(0));
        let cluster = ClusterBuilder::new()
            .node("solo")
            .register_unit_kind(Arc::new(counting_kind(
                "crashy",
                Arc::clone(&starts),
                Duration::ZERO,
            )))
            .build();
        let node = cluster.node("solo").unwrap();
        let spec = UnitSpec::new("crashy", "x");

        // The worker counts deliveries in its state and dies on the 2nd.
        let deliver = |ack: oneshot::Sender<u32>| -> contracts::UnitTask {
            Box::new(move |state| {
                let n = state.downcast_mut::<u32>().unwrap();
                *n += 1;
                if *n == 2 {
                    panic!("delivery failure");
                }
                let _ = ack.send(*n);
            })
        };

        let (tx, rx) = oneshot::channel();
        node.cast(spec.clone(), deliver(tx)).await.unwrap();
        assert_eq!(rx.await.unwrap(), 1);

        let (tx, rx) = oneshot::channel();
        node.cast(spec.clone(), deliver(tx)).await.unwrap();
        assert!(rx.await.is_err(), "second delivery crashed the worker");

        sleep(Duration::from_millis(50)).await;

        let (tx, rx) = oneshot::channel();
        node.cast(spec, deliver(tx)).await.unwrap();
        assert_eq!(rx.await.unwrap(), 1, "third cast reaches a fresh worker");
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_singleton_under_concurrent_casts() {
        let starts = Arc::new(AtomicUsize::new(0));
        let cluster = ClusterBuilder::new()
            .node("solo")
            .node("other")
            .register_unit_kind(Arc::new(counting_kind(
                "shared",
                Arc::clone(&starts),
                Duration::ZERO,
            )))
            .build();

        // Concurrent casts from two different nodes, one spec.
        let mut handles = Vec::new();
        for origin in ["solo", "other"] {
            let node = cluster.node(origin).unwrap();
            for _ in 0..5 {
                let node = node.clone();
                handles.push(tokio::spawn(async move {
                    let (tx, rx) = oneshot::channel();
                    node.cast(
                        UnitSpec::new("shared", "k"),
                        Box::new(move |state| {
                            let n = state.downcast_mut::<u32>().unwrap();
                            *n += 1;
                            let _ = tx.send(*n);
                        }),
                    )
                    .await
                    .unwrap();
                    rx.await.unwrap()
                }));
            }
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(starts.load(Ordering::SeqCst), 1, "one live worker per spec");
        assert_eq!(seen, (1..=10).collect::<Vec<u32>>(), "deliveries serialized");

        cluster.shutdown().await;
    }
}

/// Blueprint-driven wiring: config file to running cluster and stream.
#[cfg(test)]
mod blueprint_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use cluster::ClusterBuilder;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Element, UnitState};
    use rules::{PipelineDef, PipelineEmit, RuleGroup};
    use stream::{ElementStream, StreamOptions};
    use unit_router::SimpleUnit;

    use crate::support::product_rules;

    const BLUEPRINT: &str = r#"
[stream]
chunk_size = 3
done_timeout_ms = 100

[topology]
nodes = ["alpha", "beta"]

[[units]]
kind = "lookup"
ttl_ms = 250
"#;

    #[tokio::test]
    async fn test_pipeline_from_blueprint() {
        let blueprint = ConfigLoader::load_from_str(BLUEPRINT, ConfigFormat::Toml).unwrap();
        let mut builder = ClusterBuilder::from_blueprint(&blueprint);

        // Unit kinds pick up their TTL from the blueprint.
        for unit in &blueprint.units {
            builder = builder.register_unit_kind(Arc::new(
                SimpleUnit::new(
                    unit.kind.clone(),
                    |_arg| "beta".into(),
                    |arg| Ok(Box::new(arg.to_string()) as UnitState),
                )
                .with_ttl(Duration::from_millis(unit.ttl_ms)),
            ));
        }
        let cluster = builder.build();

        let def = PipelineDef::define(
            "mapping",
            vec![RuleGroup::new("product", product_rules())],
        );
        cluster.registries().register_pipeline(def.clone());

        let options = StreamOptions::from(&blueprint.stream);
        assert_eq!(options.chunk_size, 3);
        assert_eq!(options.done_timeout, Duration::from_millis(100));

        let source = (0..7).map(|i| {
            Element::new("product").with_field("provider", format!("vendor{i}"))
        });
        let mut stream = ElementStream::start(
            cluster.node("alpha").unwrap(),
            source,
            PipelineEmit::new(&def),
            options,
        );

        let mut sizes = Vec::new();
        let mut total = 0;
        while let Some(chunk) = stream.next_chunk().await {
            sizes.push(chunk.len());
            total += chunk.len();
        }
        assert_eq!(total, 7);
        assert_eq!(sizes, vec![3, 3, 1]);

        cluster.shutdown().await;
    }
}
