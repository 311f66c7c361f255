use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use futures::future::join_all;
use shardcast::errors::{BrowseError, QueryBuildError};
use shardcast::routing::{partition_set, NodeId};
use shardcast::search::top_docs::TopDocsRequest;
use shardcast::search::{Coverage, SearchResult};

use crate::utils::{hit_partitions, service, setup_tracing, Fault, TestCluster};

const A: u32 = 1;
const B: u32 = 2;
const C: u32 = 3;

fn query() -> TopDocsRequest {
    TopDocsRequest::new(r#"{"terms": ["rust", "pasta"]}"#, "user-42").with_count(5)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn slow_node_is_left_out_of_merged_result() {
    setup_tracing();
    // {0 -> A, 1 -> B, 2 -> A}
    let test_cluster = TestCluster::new(&[(A, &[0, 2]), (B, &[1])]);
    test_cluster.transport.inject(B, Fault::Hang);
    let broker = test_cluster.broker(Duration::from_millis(200));

    let start = Instant::now();
    let result = broker.browse(query().with_count(100)).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(200), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2000), "took {elapsed:?}");
    assert_eq!(hit_partitions(&result), partition_set([0, 2]));
    assert_eq!(
        result.coverage(),
        &Coverage::Partial {
            missing: partition_set([1])
        }
    );
    assert!(result.elapsed() >= Duration::from_millis(200));
    assert_eq!(test_cluster.outstanding_readers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn scattered_search_equals_single_node_search() {
    setup_tracing();
    let test_cluster = TestCluster::new(&[(A, &[0, 1]), (B, &[2, 3]), (C, &[0, 3])]);
    let broker = test_cluster.broker(Duration::from_secs(5));
    let everything = service(&partition_set([0, 1, 2, 3]), Duration::from_secs(5));

    for request in [
        query(),
        query().with_count(1),
        TopDocsRequest::new(r#"{"terms": ["search"]}"#, ""),
        TopDocsRequest::new(r#"{"terms": ["nothing-matches-this"]}"#, "k"),
    ] {
        let scattered = broker.browse(request.clone()).await.unwrap();
        let local = everything.execute(request).await;
        assert_eq!(scattered.hits, local.hits);
        assert_eq!(scattered.total_hits, local.total_hits);
        assert_eq!(scattered.facets, local.facets);
        assert!(scattered.coverage().is_complete());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn replicas_take_over_for_down_nodes() {
    setup_tracing();
    let test_cluster = TestCluster::new(&[(A, &[0, 1]), (B, &[0, 1])]);
    let broker = test_cluster.broker(Duration::from_secs(5));

    test_cluster.mark_down(&[A]);
    for i in 0..10 {
        let request = query().with_count(50);
        let request = TopDocsRequest {
            route_param: format!("user-{i}"),
            ..request
        };
        let result = broker.browse(request).await.unwrap();
        assert_eq!(hit_partitions(&result), partition_set([0, 1]));
    }
    assert!(test_cluster
        .transport
        .take_calls()
        .iter()
        .all(|node| *node == NodeId(B)));

    test_cluster.mark_down(&[A, B]);
    let result = broker.browse(query()).await.unwrap();
    assert_eq!(result.coverage(), &Coverage::NoRoute);
    assert!(result.hits.is_empty());
    assert!(test_cluster.transport.take_calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn failing_nodes_degrade_and_recover() {
    setup_tracing();
    let test_cluster = TestCluster::new(&[(A, &[0]), (B, &[1])]);
    let broker = test_cluster.broker(Duration::from_secs(5));

    test_cluster.transport.inject(A, Fault::Fail);
    test_cluster.transport.inject(B, Fault::Fail);
    let result = broker.browse(query()).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(
        result.coverage(),
        &Coverage::Unavailable {
            missing: partition_set([0, 1])
        }
    );

    test_cluster.transport.heal(A);
    test_cluster
        .transport
        .inject(B, Fault::Delay(Duration::from_millis(20)));
    let result = broker.browse(query()).await.unwrap();
    assert!(result.coverage().is_complete());
    assert_eq!(hit_partitions(&result), partition_set([0, 1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn malformed_queries_never_reach_nodes() {
    setup_tracing();
    let test_cluster = TestCluster::new(&[(A, &[0, 1])]);
    let broker = test_cluster.broker(Duration::from_secs(5));

    assert_matches!(
        broker.browse(TopDocsRequest::new("terms: rust", "k")).await,
        Err(BrowseError::QueryBuild(QueryBuildError::InvalidJson(_)))
    );
    assert_matches!(
        broker
            .browse(TopDocsRequest::new(r#"{"terms": [1, 2]}"#, "k"))
            .await,
        Err(BrowseError::QueryBuild(QueryBuildError::Rejected(_)))
    );
    assert!(test_cluster.transport.take_calls().is_empty());

    // Without broker-side validation every node answers with an empty result.
    let broker = test_cluster.unvalidating_broker(Duration::from_secs(5));
    let result = broker
        .browse(TopDocsRequest::new(r#"{"terms": [1, 2]}"#, "k"))
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(
        result.coverage(),
        &Coverage::Unavailable {
            missing: partition_set([0, 1])
        }
    );
    assert_eq!(test_cluster.transport.take_calls(), vec![NodeId(A)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(10000)]
async fn service_rejects_malformed_queries_with_empty_result() {
    setup_tracing();
    let service = service(&partition_set([0, 1, 2]), Duration::from_secs(5));

    let result = service
        .execute(TopDocsRequest::new(r#"{"words": []}"#, "k"))
        .await;
    assert!(result.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.coverage(),
        &Coverage::Unavailable {
            missing: partition_set([0, 1, 2])
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(20000)]
async fn concurrent_browses_release_all_readers() {
    setup_tracing();
    let test_cluster = TestCluster::new(&[(A, &[0, 1, 2]), (B, &[2, 3, 4]), (C, &[0, 4, 5])]);
    let broker = test_cluster.broker(Duration::from_secs(5));

    let results = join_all((0..32).map(|i| {
        let request = TopDocsRequest {
            route_param: format!("user-{i}"),
            ..query()
        };
        broker.browse(request)
    }))
    .await;

    let expected = broker.browse(query()).await.unwrap();
    for result in results {
        let result = result.unwrap();
        assert!(result.coverage().is_complete());
        assert_eq!(result.hits, expected.hits);
        assert_eq!(result.total_hits, expected.total_hits);
    }
    assert_eq!(test_cluster.outstanding_readers(), 0);
}
