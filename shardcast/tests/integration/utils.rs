use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shardcast::cluster::{Cluster, ClusterState, Node};
use shardcast::errors::{QueryBuildError, ReaderError, SearchError, TransportError};
use shardcast::query::JsonQueryBuilder;
use shardcast::routing::{NodeId, PartitionId, PartitionSet, RouterConfig};
use shardcast::search::top_docs::{Hit, TopDocsMerger, TopDocsRequest, TopDocsResult};
use shardcast::service::{CoreService, IndexReaderFactory, PartitionSearcher, SearchCore};
use shardcast::transport::{LocalTransport, NodeTransport};
use shardcast::{Broker, BrokerBuilder};

pub(crate) fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(tracing_subscriber::fmt::TestWriter::new())
        .try_init();
}

// In-memory index

#[derive(Debug)]
pub(crate) struct Doc {
    pub(crate) id: u64,
    pub(crate) text: String,
    pub(crate) category: &'static str,
}

#[derive(Debug)]
pub(crate) struct Segment {
    pub(crate) docs: Vec<Doc>,
}

const TEXTS: [(&str, &str); 6] = [
    ("rust search engine", "tech"),
    ("distributed rust broker", "tech"),
    ("fresh pasta recipes", "food"),
    ("search for the best pasta", "food"),
    ("consistent hashing explained", "tech"),
    ("weekend hiking trails", "outdoor"),
];

/// Deterministic contents of a partition. Replicas of a partition hold equal documents.
pub(crate) fn segments_of(partition: PartitionId) -> Vec<Arc<Segment>> {
    let p = partition.0 as u64;
    (0..2)
        .map(|segment| {
            let docs = TEXTS
                .iter()
                .enumerate()
                .filter(|(i, _)| (*i as u64 + p + segment) % 2 == 0)
                .map(|(i, &(text, category))| Doc {
                    id: p * 100 + segment * 10 + i as u64,
                    text: format!("{text} p{p}"),
                    category,
                })
                .collect();
            Arc::new(Segment { docs })
        })
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct SegmentReaderFactory {
    segments: Vec<Arc<Segment>>,
    outstanding: AtomicUsize,
}

impl IndexReaderFactory for SegmentReaderFactory {
    type Reader = Arc<Segment>;

    fn acquire_readers(&self) -> Result<Vec<Arc<Segment>>, ReaderError> {
        self.outstanding.fetch_add(self.segments.len(), Ordering::SeqCst);
        Ok(self.segments.clone())
    }

    fn release_readers(&self, readers: Vec<Arc<Segment>>) {
        self.outstanding.fetch_sub(readers.len(), Ordering::SeqCst);
    }
}

pub(crate) type TermsQueryFn = fn(Option<serde_json::Value>) -> Result<Vec<String>, QueryBuildError>;
pub(crate) type TermsQueryBuilder = JsonQueryBuilder<TermsQueryFn, Vec<String>>;

/// `{"terms": ["a", "b"]}`; an absent query matches everything.
fn parse_terms(json: Option<serde_json::Value>) -> Result<Vec<String>, QueryBuildError> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };
    let terms = json
        .get("terms")
        .and_then(|terms| terms.as_array())
        .ok_or_else(|| QueryBuildError::Rejected("expected a \"terms\" array".to_owned()))?;
    terms
        .iter()
        .map(|term| {
            term.as_str()
                .map(str::to_lowercase)
                .ok_or_else(|| QueryBuildError::Rejected(format!("term {term} is not a string")))
        })
        .collect()
}

pub(crate) fn terms_query_builder() -> TermsQueryBuilder {
    JsonQueryBuilder::new(parse_terms as TermsQueryFn)
}

pub(crate) struct InMemoryCore {
    factories: BTreeMap<PartitionId, Arc<SegmentReaderFactory>>,
    query_builder: TermsQueryBuilder,
}

impl InMemoryCore {
    pub(crate) fn new(partitions: &PartitionSet) -> Self {
        let factories = partitions
            .iter()
            .map(|&p| {
                let factory = SegmentReaderFactory {
                    segments: segments_of(p),
                    outstanding: AtomicUsize::new(0),
                };
                (p, Arc::new(factory))
            })
            .collect();
        InMemoryCore {
            factories,
            query_builder: terms_query_builder(),
        }
    }

    /// Readers acquired and not yet released, over all partitions.
    pub(crate) fn outstanding_readers(&self) -> usize {
        self.factories
            .values()
            .map(|f| f.outstanding.load(Ordering::SeqCst))
            .sum()
    }
}

impl SearchCore for InMemoryCore {
    type ReaderFactory = SegmentReaderFactory;
    type QueryBuilder = TermsQueryBuilder;

    fn partitions(&self) -> PartitionSet {
        self.factories.keys().copied().collect()
    }

    fn reader_factory(&self, partition: PartitionId) -> Option<Arc<SegmentReaderFactory>> {
        self.factories.get(&partition).cloned()
    }

    fn query_builder(&self) -> &TermsQueryBuilder {
        &self.query_builder
    }
}

/// Scores a document by the number of query terms it contains.
pub(crate) struct TermSearcher;

impl PartitionSearcher<InMemoryCore> for TermSearcher {
    type Request = TopDocsRequest;
    type Result = TopDocsResult;

    fn search_partition(
        &self,
        request: &TopDocsRequest,
        partition: PartitionId,
        readers: &[Arc<Segment>],
        terms: &Vec<String>,
    ) -> Result<TopDocsResult, SearchError> {
        let mut hits = Vec::new();
        let mut facets: BTreeMap<String, u64> = BTreeMap::new();
        for doc in readers.iter().flat_map(|segment| segment.docs.iter()) {
            let words: Vec<&str> = doc.text.split_whitespace().collect();
            let score = if terms.is_empty() {
                1
            } else {
                terms.iter().filter(|t| words.contains(&t.as_str())).count()
            };
            if score == 0 {
                continue;
            }
            *facets.entry(doc.category.to_owned()).or_default() += 1;
            hits.push(Hit {
                doc_id: doc.id,
                score: score as f32,
                partition,
            });
        }
        let total = hits.len() as u64;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        hits.truncate(request.count);
        Ok(TopDocsResult::new(hits, total).with_facets(facets))
    }
}

pub(crate) type Service = CoreService<InMemoryCore, TermSearcher>;

pub(crate) fn service(partitions: &PartitionSet, timeout: Duration) -> Arc<Service> {
    Arc::new(
        CoreService::builder(
            Arc::new(InMemoryCore::new(partitions)),
            Arc::new(TermSearcher),
            Arc::new(TopDocsMerger),
        )
        .timeout(timeout)
        .build(),
    )
}

// Transport

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    Fail,
    Hang,
    Delay(Duration),
}

/// [LocalTransport] with injectable per-node faults and a call log.
pub(crate) struct FaultyTransport {
    inner: LocalTransport<InMemoryCore, TermSearcher>,
    faults: Mutex<HashMap<NodeId, Fault>>,
    calls: Mutex<Vec<NodeId>>,
}

impl FaultyTransport {
    pub(crate) fn inject(&self, node: u32, fault: Fault) {
        self.faults.lock().unwrap().insert(NodeId(node), fault);
    }

    pub(crate) fn heal(&self, node: u32) {
        self.faults.lock().unwrap().remove(&NodeId(node));
    }

    pub(crate) fn take_calls(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl NodeTransport<TopDocsRequest, TopDocsResult> for FaultyTransport {
    async fn send_to_node(
        &self,
        request: TopDocsRequest,
        node: &Arc<Node>,
    ) -> Result<TopDocsResult, TransportError> {
        self.calls.lock().unwrap().push(node.id);
        let fault = self.faults.lock().unwrap().get(&node.id).copied();
        match fault {
            None => self.inner.send_to_node(request, node).await,
            Some(Fault::Fail) => Err(TransportError::Remote(format!("{node} refused"))),
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                self.inner.send_to_node(request, node).await
            }
        }
    }
}

/// Nodes, their services and a broker wired together in one process.
pub(crate) struct TestCluster {
    pub(crate) cluster: Cluster,
    pub(crate) transport: Arc<FaultyTransport>,
    pub(crate) services: BTreeMap<NodeId, Arc<Service>>,
    layout: Vec<Node>,
}

impl TestCluster {
    /// `layout` lists `(node id, partitions served)`.
    pub(crate) fn new(layout: &[(u32, &[u32])]) -> Self {
        let nodes: Vec<Node> = layout
            .iter()
            .map(|&(id, partitions)| Node::new(id, partitions.iter().copied().map(PartitionId)))
            .collect();

        let mut inner = LocalTransport::new();
        let mut services = BTreeMap::new();
        for node in &nodes {
            let service = service(&node.partitions, Duration::from_secs(5));
            inner.register(node.id, Arc::clone(&service));
            services.insert(node.id, service);
        }

        let cluster = Cluster::connected(ClusterState::new(nodes.clone(), &RouterConfig::default()));
        TestCluster {
            cluster,
            transport: Arc::new(FaultyTransport {
                inner,
                faults: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }),
            services,
            layout: nodes,
        }
    }

    pub(crate) fn broker(&self, timeout: Duration) -> Broker<TopDocsRequest, TopDocsResult> {
        self.broker_builder(timeout)
            .query_builder(terms_query_builder())
            .build()
    }

    /// A broker that leaves query validation to the nodes.
    pub(crate) fn unvalidating_broker(&self, timeout: Duration) -> Broker<TopDocsRequest, TopDocsResult> {
        self.broker_builder(timeout).build()
    }

    fn broker_builder(&self, timeout: Duration) -> BrokerBuilder<TopDocsRequest, TopDocsResult> {
        BrokerBuilder::<TopDocsRequest, TopDocsResult>::new(
            self.cluster.clone(),
            self.transport.clone(),
            Arc::new(TopDocsMerger),
        )
        .timeout(timeout)
    }

    /// Installs a snapshot in which the given nodes are down.
    pub(crate) fn mark_down(&self, down: &[u32]) {
        let nodes = self.layout.iter().map(|node| {
            if down.contains(&node.id.0) {
                node.clone().down()
            } else {
                node.clone()
            }
        });
        self.cluster
            .install(ClusterState::new(nodes, &RouterConfig::default()));
    }

    pub(crate) fn outstanding_readers(&self) -> usize {
        self.services
            .values()
            .map(|service| service.core().outstanding_readers())
            .sum()
    }
}

pub(crate) fn hit_partitions(result: &TopDocsResult) -> PartitionSet {
    result.hits.iter().map(|hit| hit.partition).collect()
}
