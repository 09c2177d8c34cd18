//! Job graph: work nodes, their shared templates, and precedence edges.
//!
//! Every top-level job entry becomes one [`WorkNode`]. A node's jobs share a
//! single immutable [`JobTemplate`] stored in an arena; descriptors hold an
//! `Arc` to it, never a copy. Edges point from an upstream node to the node
//! that depends on it and are kept acyclic.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::jobdef::{InputSpec, JobDefinition, JobEntry};
use crate::scheduler::job::NodeIndex;

/// Identity of a shared input resource, 1-based in order of first use.
pub type ResourceId = u64;

/// Index into the template arena.
pub type TemplateId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOrigin {
    Inline,
    Pool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub name: String,
    pub origin: ResourceOrigin,
}

/// Immutable data shared by every job of one work node.
#[derive(Debug)]
pub struct JobTemplate {
    pub node: NodeIndex,
    pub resource: ResourceId,
    pub tag: String,
    pub options: serde_json::Value,
    pub config: Arc<EngineConfig>,
}

#[derive(Debug, Clone)]
pub struct WorkNode {
    pub index: NodeIndex,
    pub nstruct: u64,
    pub label: Option<String>,
    template: std::result::Result<TemplateId, String>,
}

impl WorkNode {
    pub fn template_id(&self) -> Option<TemplateId> {
        self.template.as_ref().ok().copied()
    }

    /// Why the node's template could not be built, if it could not.
    pub fn resolution_error(&self) -> Option<&str> {
        self.template.as_ref().err().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct JobGraph {
    nodes: Vec<WorkNode>,
    templates: Vec<Arc<JobTemplate>>,
    resources: Vec<ResourceInfo>,
    pool_resources: HashMap<String, ResourceId>,
    /// (upstream, downstream)
    edges: BTreeSet<(NodeIndex, NodeIndex)>,
    config: Arc<EngineConfig>,
}

impl JobGraph {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            ..Default::default()
        }
    }

    /// Build one node per job entry, in declaration order, plus any declared
    /// dependency edges.
    pub fn create_initial(def: &JobDefinition, config: EngineConfig) -> Result<Self> {
        def.validate()?;
        let mut graph = Self::new(config);
        for entry in &def.jobs {
            graph.add_node(entry);
        }
        for dep in &def.dependencies {
            graph.add_edge(dep.depends_on, dep.node)?;
        }
        tracing::debug!(
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            "Job graph created"
        );
        Ok(graph)
    }

    /// Append nodes discovered after startup. Returns their indices.
    pub fn update(&mut self, entries: &[JobEntry]) -> Vec<NodeIndex> {
        entries.iter().map(|entry| self.add_node(entry)).collect()
    }

    pub fn add_node(&mut self, entry: &JobEntry) -> NodeIndex {
        let index = self.nodes.len() as NodeIndex + 1;
        let nstruct = entry.nstruct.unwrap_or(self.config.default_nstruct);

        let template = match self.resolve_resource(&entry.input) {
            Ok(resource) => {
                let tag = match &entry.tag {
                    Some(tag) => tag.clone(),
                    None => self
                        .resource(resource)
                        .map(|info| Self::default_tag(&info.name))
                        .unwrap_or_default(),
                };
                self.templates.push(Arc::new(JobTemplate {
                    node: index,
                    resource,
                    tag,
                    options: entry.options.clone(),
                    config: self.config.clone(),
                }));
                Ok(self.templates.len() - 1)
            }
            Err(reason) => Err(reason),
        };

        self.nodes.push(WorkNode {
            index,
            nstruct,
            label: entry.label.clone(),
            template,
        });
        index
    }

    fn resolve_resource(&mut self, input: &InputSpec) -> std::result::Result<ResourceId, String> {
        match input {
            InputSpec::Inline { resource } => {
                Ok(self.push_resource(resource, ResourceOrigin::Inline))
            }
            InputSpec::Pool { resource } => {
                if let Some(&id) = self.pool_resources.get(resource) {
                    return Ok(id);
                }
                let id = self.push_resource(resource, ResourceOrigin::Pool);
                self.pool_resources.insert(resource.clone(), id);
                Ok(id)
            }
            InputSpec::Missing => Err("no input resource declared for job entry".to_string()),
        }
    }

    fn push_resource(&mut self, name: &str, origin: ResourceOrigin) -> ResourceId {
        let id = self.resources.len() as ResourceId + 1;
        self.resources.push(ResourceInfo {
            id,
            name: name.to_string(),
            origin,
        });
        id
    }

    /// `1ubq.pdb` and `inputs/1ubq.pdb` both tag as `1ubq`.
    fn default_tag(name: &str) -> String {
        let base = name.rsplit('/').next().unwrap_or(name);
        match base.split_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => base.to_string(),
        }
    }

    /// Add a precedence edge: `downstream` waits for `upstream`.
    pub fn add_edge(&mut self, upstream: NodeIndex, downstream: NodeIndex) -> Result<()> {
        self.node(upstream)?;
        self.node(downstream)?;
        if upstream == downstream || self.reaches(downstream, upstream) {
            return Err(EngineError::CycleDetected {
                from: upstream,
                to: downstream,
            });
        }
        self.edges.insert((upstream, downstream));
        Ok(())
    }

    fn reaches(&self, from: NodeIndex, target: NodeIndex) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.downstream(node));
            }
        }
        false
    }

    pub fn node(&self, index: NodeIndex) -> Result<&WorkNode> {
        index
            .checked_sub(1)
            .and_then(|i| self.nodes.get(i as usize))
            .ok_or(EngineError::UnknownNode(index))
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> Result<&mut WorkNode> {
        index
            .checked_sub(1)
            .and_then(|i| self.nodes.get_mut(i as usize))
            .ok_or(EngineError::UnknownNode(index))
    }

    pub fn nodes(&self) -> &[WorkNode] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.edges.iter().copied()
    }

    pub fn upstream(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.edges
            .iter()
            .filter(|(_, to)| *to == node)
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn downstream(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.edges
            .range((node, 0)..=(node, NodeIndex::MAX))
            .map(|(_, to)| *to)
            .collect()
    }

    pub fn template(&self, node: NodeIndex) -> Result<Arc<JobTemplate>> {
        let work_node = self.node(node)?;
        match &work_node.template {
            Ok(id) => Ok(self.templates[*id].clone()),
            Err(reason) => Err(EngineError::TemplateUnresolved {
                node,
                reason: reason.clone(),
            }),
        }
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceInfo> {
        id.checked_sub(1).and_then(|i| self.resources.get(i as usize))
    }

    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }

    pub fn set_node_label(&mut self, node: NodeIndex, label: impl Into<String>) -> Result<()> {
        self.node_mut(node)?.label = Some(label.into());
        Ok(())
    }

    pub fn node_label(&self, node: NodeIndex) -> Option<&str> {
        self.node(node).ok().and_then(|n| n.label.as_deref())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
