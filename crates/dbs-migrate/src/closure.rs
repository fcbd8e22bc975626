use dbs_remote::RemoteClient;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Computes the ordered, deduplicated list of blocks that must be inserted
/// locally to satisfy a migration (C2).
#[derive(Clone)]
pub struct ClosureResolver {
    client: Arc<RemoteClient>,
}

impl ClosureResolver {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }

    /// Resolve `input` (block or dataset name) against `source_url`,
    /// diffing against whatever is already present at `local_url`.
    pub async fn resolve(&self, source_url: &str, local_url: &str, input: &str) -> Vec<String> {
        let mut plan = if dbs_api::is_block_name(input) {
            self.resolve_block(source_url, local_url, input).await
        } else {
            self.resolve_dataset(source_url, local_url, input).await
        };
        Self::sort_plan(&mut plan);
        plan
    }

    async fn resolve_block(&self, source_url: &str, local_url: &str, block: &str) -> Vec<String> {
        match self.client.list_blocks(local_url, block).await {
            Ok(present) if !present.is_empty() => {
                debug!(block, "already present locally, nothing to migrate");
                return Vec::new();
            }
            Err(e) => warn!(block, error = %e, "local presence check failed, proceeding"),
            _ => {}
        }

        let at_source = match self.client.list_blocks(source_url, block).await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(block, error = %e, "unable to query source, dropping branch");
                return Vec::new();
            }
        };
        if at_source.is_empty() {
            info!(block, "not found at source");
            return Vec::new();
        }

        let source_closure = self.block_closure(source_url, block).await;
        let mut local_closure: HashSet<String> =
            self.block_closure(local_url, block).await.into_iter().collect();
        // `block_closure` always seeds its traversal with `block` itself, but
        // we have already confirmed above that `block` is absent locally; its
        // presence in `local_closure` is a traversal artifact, not a fact
        // about the local catalog, so it must not suppress `block` from the
        // plan.
        local_closure.remove(block);

        source_closure
            .into_iter()
            .filter(|b| !local_closure.contains(b))
            .collect()
    }

    async fn resolve_dataset(&self, source_url: &str, local_url: &str, dataset: &str) -> Vec<String> {
        let datasets = self.dataset_closure(source_url, dataset).await;
        let mut plan = Vec::new();
        for ds in datasets {
            let residual = self.dataset_residual(source_url, local_url, &ds).await;
            plan.extend(residual);
        }
        plan
    }

    async fn dataset_residual(&self, source_url: &str, local_url: &str, dataset: &str) -> Vec<String> {
        let src_blocks = match self.client.list_blocks(source_url, dataset).await {
            Ok(b) => b,
            Err(e) => {
                warn!(dataset, error = %e, "unable to query source blocks, dropping branch");
                return Vec::new();
            }
        };
        let local_blocks: HashSet<String> = match self.client.list_blocks(local_url, dataset).await {
            Ok(b) => b.into_iter().collect(),
            Err(e) => {
                warn!(dataset, error = %e, "unable to query local blocks, assuming none present");
                HashSet::new()
            }
        };
        src_blocks
            .into_iter()
            .filter(|b| !local_blocks.contains(b))
            .collect()
    }

    /// Transitive closure of `list_parents` over blocks, including `start`
    /// itself. Frontier expansion fans out concurrently per level via
    /// `tokio::spawn` + `futures::future::join_all` (§5), replacing the
    /// source's 100ms poll loop.
    async fn block_closure(&self, url: &str, start: &str) -> Vec<String> {
        self.closure(url, start, |client, url, node| {
            let url = url.to_string();
            let node = node.to_string();
            let client = client.clone();
            async move {
                client.list_parents(&url, &node).await.unwrap_or_else(|e| {
                    warn!(node, error = %e, "unable to expand parents, dropping branch");
                    Vec::new()
                })
            }
        })
        .await
    }

    async fn dataset_closure(&self, url: &str, start: &str) -> Vec<String> {
        self.closure(url, start, |client, url, node| {
            let url = url.to_string();
            let node = node.to_string();
            let client = client.clone();
            async move {
                client.list_parents(&url, &node).await.unwrap_or_else(|e| {
                    warn!(node, error = %e, "unable to expand parents, dropping branch");
                    Vec::new()
                })
            }
        })
        .await
    }

    /// Generic BFS over `expand_parents`, defending against cycles with a
    /// visited-set keyed on node name; a revisit is skipped, not re-expanded.
    async fn closure<F, Fut>(&self, url: &str, start: &str, expand_parents: F) -> Vec<String>
    where
        F: Fn(Arc<RemoteClient>, String, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Vec<String>> + Send + 'static,
    {
        let expand_parents = Arc::new(expand_parents);
        let mut visited: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        let mut frontier = vec![start.to_string()];
        visited.insert(start.to_string());
        out.push(start.to_string());

        while !frontier.is_empty() {
            let tasks: Vec<_> = frontier
                .iter()
                .map(|node| {
                    let client = self.client.clone();
                    let url = url.to_string();
                    let node = node.clone();
                    let expand_parents = expand_parents.clone();
                    tokio::spawn(async move { expand_parents(client, url, node).await })
                })
                .collect();

            let results = futures::future::join_all(tasks).await;
            let mut next_frontier = Vec::new();
            for result in results {
                let parents = result.unwrap_or_default();
                for parent in parents {
                    if visited.insert(parent.clone()) {
                        out.push(parent.clone());
                        next_frontier.push(parent);
                    }
                }
            }
            frontier = next_frontier;
        }

        out
    }

    /// Sort the deduplicated plan in descending lexicographic order of name,
    /// exploiting the naming convention where parent versions compare
    /// higher. Callers treat order as opaque but monotonic.
    fn sort_plan(plan: &mut [String]) {
        plan.sort_by(|a, b| b.cmp(a));
    }
}
