//! Hydrofabric flow network
//!
//! Vertices are network ids (`wb-`, `nex-`, `tnx-`, ...), edges point
//! downstream. Each waterbody vertex remembers the catchment draining into
//! it, so upstream tracing can answer in catchment terms.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::time::SystemTime;

use bitcode::{Decode, Encode};
use ngprep_core::ids::numeric_stem;
use ngprep_core::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, info, warn};

use crate::gpkg::{Hydrofabric, NetworkEdge};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct Vertex {
    name: String,
    cat: Option<String>,
}

#[derive(Encode, Decode)]
struct CachedNetwork {
    version: u32,
    edges: Vec<(String, Option<String>, Option<String>)>,
}

/// Directed flow network built from the `network` table
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    graph: DiGraph<Vertex, ()>,
    by_name: HashMap<String, NodeIndex>,
    by_cat: HashMap<String, NodeIndex>,
}

impl NetworkGraph {
    pub fn from_edges(edges: &[NetworkEdge]) -> Self {
        let mut net = Self::default();
        for edge in edges {
            let from = net.vertex(&edge.id);
            if let Some(cat) = &edge.divide_id {
                net.graph[from].cat = Some(cat.clone());
                let prefer = edge.id.starts_with("wb-") || !net.by_cat.contains_key(cat);
                if prefer {
                    net.by_cat.insert(cat.clone(), from);
                }
            }
            if let Some(toid) = &edge.toid {
                let to = net.vertex(toid);
                if net.graph.find_edge(from, to).is_none() {
                    net.graph.add_edge(from, to, ());
                }
            }
        }
        debug!(
            "Network graph: {} vertices, {} edges",
            net.graph.node_count(),
            net.graph.edge_count()
        );
        net
    }

    fn vertex(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(Vertex {
            name: name.to_string(),
            cat: None,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    /// Load the cached network, rebuilding it from the hydrofabric when the
    /// cache is missing, unreadable or older than the hydrofabric
    pub fn load_or_build(hydrofabric: &Hydrofabric, cache: &Path) -> Result<Self> {
        if cache_is_fresh(hydrofabric.path(), cache) {
            match Self::read_cache(cache) {
                Ok(net) => {
                    debug!("Loaded network graph from {}", cache.display());
                    return Ok(net);
                }
                Err(e) => warn!("Network cache {} unusable, rebuilding: {}", cache.display(), e),
            }
        }

        info!("Building network graph");
        let edges = hydrofabric.network_edges()?;
        let net = Self::from_edges(&edges);
        if let Err(e) = write_cache(cache, &edges) {
            warn!("Could not write network cache {}: {}", cache.display(), e);
        }
        Ok(net)
    }

    fn read_cache(cache: &Path) -> Result<Self> {
        let bytes = std::fs::read(cache)?;
        let cached: CachedNetwork =
            bitcode::decode(&bytes).map_err(|e| Error::Other(format!("decode: {}", e)))?;
        if cached.version != CACHE_VERSION {
            return Err(Error::Other(format!("cache version {}", cached.version)));
        }
        let edges: Vec<NetworkEdge> = cached
            .edges
            .into_iter()
            .map(|(id, toid, divide_id)| NetworkEdge { id, toid, divide_id })
            .collect();
        Ok(Self::from_edges(&edges))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Catchment draining into a vertex
    pub fn catchment_of(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .and_then(|&idx| self.graph[idx].cat.as_deref())
    }

    /// The vertex immediately downstream of `wb-<stem>` for a `wb-` or
    /// `cat-` id
    pub fn outlet_id(&self, wb_or_cat: &str) -> Option<String> {
        let name = format!("wb-{}", numeric_stem(wb_or_cat));
        let idx = *self.by_name.get(&name)?;
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()
            .map(|n| self.graph[n].name.clone())
    }

    /// Every vertex upstream of `start`, including it
    fn upstream_of(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = vec![start];
        let mut visited = std::collections::HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for parent in self.graph.neighbors_directed(current, Direction::Incoming) {
                if visited.insert(parent) {
                    seen.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        seen
    }

    /// All catchments upstream of, and including, the given catchments.
    ///
    /// Unknown ids are skipped; networks shared by several inputs are
    /// visited once.
    pub fn upstream_cats<S: AsRef<str>>(&self, names: &[S]) -> BTreeSet<String> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut cats = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            if visited.contains(name) {
                continue;
            }
            let Some(&start) = self.by_cat.get(name) else {
                debug!("{} is not in the network", name);
                continue;
            };
            for idx in self.upstream_of(start) {
                let vertex = &self.graph[idx];
                visited.insert(vertex.name.clone());
                if let Some(cat) = &vertex.cat {
                    cats.insert(cat.clone());
                }
            }
        }
        cats
    }

    /// All network ids upstream of, and including, each start.
    ///
    /// With `include_outlet` a catchment or waterbody start is replaced by
    /// its outlet nexus, so the nexus and everything draining to it are
    /// included. Without it tracing starts at `wb-<stem>`.
    pub fn upstream_ids<S: AsRef<str>>(&self, names: &[S], include_outlet: bool) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let is_flowpath = name.contains("wb") || name.contains("cat");
            let start = if is_flowpath && include_outlet {
                match self.outlet_id(name) {
                    Some(outlet) => outlet,
                    None => {
                        warn!("{} has no downstream outlet, tracing from the waterbody", name);
                        format!("wb-{}", numeric_stem(name))
                    }
                }
            } else if is_flowpath {
                format!("wb-{}", numeric_stem(name))
            } else {
                name.to_string()
            };
            if ids.contains(&start) {
                continue;
            }
            let idx = *self
                .by_name
                .get(&start)
                .ok_or_else(|| Error::FeatureNotFound(format!("{} is not in the network", start)))?;
            for node in self.upstream_of(idx) {
                ids.insert(self.graph[node].name.clone());
            }
        }
        Ok(ids)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn cache_is_fresh(hydrofabric: &Path, cache: &Path) -> bool {
    match (modified(hydrofabric), modified(cache)) {
        (Some(hf), Some(c)) => c >= hf,
        _ => false,
    }
}

fn write_cache(cache: &Path, edges: &[NetworkEdge]) -> Result<()> {
    if let Some(parent) = cache.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cached = CachedNetwork {
        version: CACHE_VERSION,
        edges: edges
            .iter()
            .map(|e| (e.id.clone(), e.toid.clone(), e.divide_id.clone()))
            .collect(),
    };
    std::fs::write(cache, bitcode::encode(&cached))?;
    Ok(())
}
